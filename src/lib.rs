extern crate serialport;

pub mod record;
pub mod session;
pub mod sink;

use std::io::BufRead;
use std::sync::mpsc;
use std::sync::mpsc::{Receiver, Sender};
use std::thread;

use record::Record;
use session::{CommandOutcome, LineDisposition, LogSession};
use sink::CsvSink;

/// Baud rate the scale firmware ships with.
pub const DEFAULT_BAUD: u32 = 115_200;

pub enum DeviceNotification {
    /// One parsed line from the scale. Emitted for every line regardless of
    /// session state; `recorded` says whether it was appended to the sink.
    Reading { record: Record, recorded: bool },
    /// The operator armed logging. Emitted at most once per connection.
    LoggingStarted,
    /// An operator command was handed to the sender thread. `command` is the
    /// trimmed text, exactly as written to the port.
    CommandForwarded { command: String },
    /// The port stream reported an error (or ended). Non-fatal: reading may
    /// have stopped, but commands are still accepted and attempted.
    PortError { message: String },
    /// Appending to the CSV file failed. The reading it accompanies is
    /// still delivered, marked as not recorded.
    SinkError { message: String },
    ConnectionClosed,
}

pub enum Action {
    /// One raw line of operator input. Trimming and the arming rule are
    /// applied on the session thread, then the text goes out on the wire.
    OperatorInput(String),
}

/// Events flowing from the receiver thread to the session thread.
enum PortEvent {
    Line(String),
    Error(String),
}

pub struct Device {
    tx_action: Sender<Action>,
}

impl Device {
    pub fn connect_path(
        path: String,
        baud_rate: u32,
        sink: CsvSink,
        device_callback: Option<impl Fn(&DeviceNotification) + 'static + std::marker::Send>,
    ) -> serialport::Result<Device> {
        let port = serialport::new(path, baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            // The timeout is relevant for receiver_thread's behaviour (below).
            .timeout(core::time::Duration::from_millis(100))
            .open()?;

        // Cloning here is a bit ugly - it's necessary because we want to split
        // reads and writes, and Serialport implements both in the same object.
        // Read and writes are mutating, hence an Arc is insufficient. A (rust)
        // Mutex also doesn't work because reads and writes need to be
        // independent. Cloning is good enough.
        let reader = std::io::BufReader::new(port.try_clone()?);

        let (tx_action, rx_action): (Sender<Action>, Receiver<Action>) = mpsc::channel();
        let (tx_command, rx_command): (Sender<String>, Receiver<String>) = mpsc::channel();
        // Option::None is used as a check-alive signal (see details in
        // start_receiver_thread).
        let (tx_event, rx_event): (Sender<Option<PortEvent>>, Receiver<Option<PortEvent>>) =
            mpsc::channel();

        let _session_thread =
            start_session_thread(rx_action, rx_event, tx_command, sink, device_callback);
        let _sender_thread = start_sender_thread(port, rx_command);
        let _receiver_thread = start_receiver_thread(reader, tx_event);

        Ok(Device { tx_action })
    }

    pub fn perform_action(&self, action: Action) {
        if let Err(e) = self.tx_action.send(action) {
            // The session thread is gone; there is nothing useful left to do
            // with operator input.
            eprintln!("tx_action failed: {e:?}");
        }
    }
}

/// The single dispatcher: multiplexes device lines and operator input onto
/// one thread. The two sources stay FIFO within themselves; nothing here
/// needs a lock because the session state has exactly one owner. Sink
/// appends happen inline on this thread, which is what guarantees rows land
/// in admission order.
fn start_session_thread(
    rx_action: Receiver<Action>,
    rx_event: Receiver<Option<PortEvent>>,
    tx_command: Sender<String>,
    sink: CsvSink,
    device_callback: Option<impl Fn(&DeviceNotification) + 'static + std::marker::Send>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let send_notification = |notification: &DeviceNotification| {
            if let Some(callback) = &device_callback {
                callback(notification);
            }
        };

        let mut session = LogSession::new(sink);
        loop {
            // The duration is largely arbitrary, and chosen to hopefully
            // provide sufficient responsiveness for operator input.
            let event = match rx_event.recv_timeout(core::time::Duration::from_millis(50)) {
                Ok(None) => None,
                Ok(Some(event)) => Some(event),
                Err(error) => match error {
                    mpsc::RecvTimeoutError::Timeout => None,
                    _ => {
                        send_notification(&DeviceNotification::ConnectionClosed);
                        return;
                    }
                },
            };

            match event {
                Some(PortEvent::Line(line)) => {
                    let (record, disposition) = session.handle_line(&line);
                    if let LineDisposition::SinkFailed(e) = &disposition {
                        send_notification(&DeviceNotification::SinkError {
                            message: e.to_string(),
                        });
                    }
                    send_notification(&DeviceNotification::Reading {
                        record,
                        recorded: matches!(disposition, LineDisposition::Recorded),
                    });
                }
                Some(PortEvent::Error(message)) => {
                    send_notification(&DeviceNotification::PortError { message });
                }
                None => (),
            }

            match rx_action.try_recv() {
                Ok(Action::OperatorInput(input)) => {
                    let CommandOutcome {
                        command,
                        started_logging,
                    } = session.handle_command(&input);
                    if started_logging {
                        send_notification(&DeviceNotification::LoggingStarted);
                    }
                    if let Err(e) = tx_command.send(command.clone()) {
                        // The sender thread only exits when its channel
                        // closes, so this means the port write side is gone.
                        eprintln!("tx_command failed: {e:?}");
                    }
                    send_notification(&DeviceNotification::CommandForwarded { command });
                }
                Err(mpsc::TryRecvError::Empty) => (),
                Err(mpsc::TryRecvError::Disconnected) => {
                    send_notification(&DeviceNotification::ConnectionClosed);
                    return;
                }
            }
        }
    })
}

fn start_sender_thread(
    mut writer: Box<dyn serialport::SerialPort>,
    rx_command: Receiver<String>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || loop {
        let Ok(command) = rx_command.recv() else {
            // Session thread is gone, nothing will ever send again.
            return;
        };
        // Fire-and-forget: the command goes out verbatim (no terminator -
        // the scale treats any byte sequence as a command) and a failed
        // write is reported but not retried. If the port is down the
        // operator restarts the tool.
        if let Err(e) = writer.write_all(command.as_bytes()) {
            eprintln!("failed to write to port: {e}");
        }
    })
}

fn start_receiver_thread(
    mut reader: std::io::BufReader<Box<dyn serialport::SerialPort>>,
    tx_event: Sender<Option<PortEvent>>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut buf = String::new();
        loop {
            // read_line blocks until we get content OR until we reach the
            // timeout (set on the port). To detect that the session thread
            // has wound down we check whether the channel is still open, and
            // the only way to check is to try send()'ing. Therefore we
            // periodically send None's to the channel; the short port timeout
            // makes sure that happens often enough.
            match reader.read_line(&mut buf) {
                Ok(0) => {
                    // EOF. The stream will not resume, but the process must
                    // keep running: operator commands are still accepted (and
                    // their writes attempted) until the tool is restarted.
                    let _ = tx_event.send(Some(PortEvent::Error(
                        "serial stream ended".to_string(),
                    )));
                    keep_alive(&tx_event);
                    return;
                }
                Err(error) => match error.kind() {
                    std::io::ErrorKind::TimedOut => {
                        // "Is channel still open" check - see comment above.
                        if tx_event.send(None).is_err() {
                            return;
                        }
                        continue;
                    }
                    _ => {
                        // Same policy as EOF: report once, stop reading, keep
                        // the connection's write side serviceable.
                        let _ = tx_event.send(Some(PortEvent::Error(error.to_string())));
                        keep_alive(&tx_event);
                        return;
                    }
                },
                Ok(_) => (),
            };
            // BufReader removes the trailing <LF>, trimming removes the
            // remaining <CR> plus any padding the firmware emits.
            let line = buf.trim().to_string();
            if tx_event.send(Some(PortEvent::Line(line))).is_err() {
                return;
            }
            buf.clear();
        }
    })
}

/// Park after the port stream has died: keep probing the channel so the
/// thread still winds down once the session thread does.
fn keep_alive(tx_event: &Sender<Option<PortEvent>>) {
    loop {
        std::thread::sleep(core::time::Duration::from_millis(100));
        if tx_event.send(None).is_err() {
            return;
        }
    }
}
