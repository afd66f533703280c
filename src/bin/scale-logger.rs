use std::io::Write;
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;

use clap::Parser;
use serialport::{SerialPortInfo, SerialPortType};

use scalelog::sink::CsvSink;
use scalelog::{Action, Device, DeviceNotification, DEFAULT_BAUD};

/// Interactive logger for line-oriented serial scales: watch readings as
/// they stream in, record them to a CSV file under data/, and type commands
/// back to the device. Any command containing an 's' starts recording.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Serial device path (e.g. /dev/ttyUSB0). Prompts for a port when omitted.
    #[arg(short, long)]
    port: Option<String>,

    /// Baud rate.
    #[arg(long, default_value_t = DEFAULT_BAUD)]
    baud: u32,

    /// Output name; readings land in data/<name>.csv. Prompts when omitted,
    /// defaulting to a timestamped name.
    #[arg(short, long)]
    output: Option<String>,
}

fn default_file_name() -> String {
    let now = time::OffsetDateTime::now_utc();
    let format = time::macros::format_description!(
        version = 2,
        "[year][month][day]_[hour][minute][second]"
    );
    format!("{}_data", now.format(&format).unwrap())
}

fn prompt_file_name() -> Option<String> {
    let default = default_file_name();
    print!("Enter the filename [{default}]: ");
    let _ = std::io::stdout().flush();

    let mut input = String::new();
    match std::io::stdin().read_line(&mut input) {
        Ok(0) | Err(_) => None,
        Ok(_) => {
            let name = input.trim();
            Some(if name.is_empty() {
                default
            } else {
                name.to_string()
            })
        }
    }
}

fn manufacturer(port: &SerialPortInfo) -> &str {
    match &port.port_type {
        SerialPortType::UsbPort(usb) => {
            usb.manufacturer.as_deref().unwrap_or("Unknown manufacturer")
        }
        _ => "Unknown manufacturer",
    }
}

/// 1-based selection against a list of `count` choices.
fn parse_selection(input: &str, count: usize) -> Option<usize> {
    match input.trim().parse::<usize>() {
        Ok(n) if (1..=count).contains(&n) => Some(n - 1),
        _ => None,
    }
}

fn select_port() -> Option<String> {
    let ports = match serialport::available_ports() {
        Ok(ports) => ports,
        Err(e) => {
            eprintln!("Failed to list serial ports: {e}");
            std::process::exit(1);
        }
    };
    if ports.is_empty() {
        eprintln!("No serial ports found");
        std::process::exit(1);
    }

    println!("Select a serial port:");
    for (i, port) in ports.iter().enumerate() {
        println!("  {}) {} - {}", i + 1, port.port_name, manufacturer(port));
    }

    let stdin = std::io::stdin();
    loop {
        print!("Port [1-{}]: ", ports.len());
        let _ = std::io::stdout().flush();

        let mut input = String::new();
        match stdin.read_line(&mut input) {
            Ok(0) | Err(_) => return None,
            Ok(_) => (),
        }
        match parse_selection(&input, ports.len()) {
            Some(index) => return Some(ports[index].port_name.clone()),
            None => println!("Invalid selection"),
        }
    }
}

fn main() {
    eprintln!("scale-logger (v{})", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();

    let name = match cli.output {
        Some(name) => name,
        None => match prompt_file_name() {
            Some(name) => name,
            None => {
                eprintln!("No filename entered");
                return;
            }
        },
    };
    let sink = CsvSink::create(PathBuf::from("data").join(format!("{name}.csv")));

    let port_path = match cli.port {
        Some(path) => path,
        None => match select_port() {
            Some(path) => path,
            None => {
                eprintln!("No port selected");
                return;
            }
        },
    };

    let (tx_done, rx_done) = mpsc::channel();
    let tx_request_exit = tx_done.clone();
    let tx_connection_closed = tx_done.clone();

    let callback = move |notification: &DeviceNotification| match notification {
        DeviceNotification::Reading { record, recorded } => {
            if *recorded {
                println!("Logged: {:?}", record.fields());
            } else {
                println!("Not logging.. {:?}", record.fields());
            }
        }
        DeviceNotification::LoggingStarted => println!("Started logging!"),
        DeviceNotification::CommandForwarded { command } => println!("{command}"),
        DeviceNotification::PortError { message } => eprintln!("Error: {message}"),
        DeviceNotification::SinkError { message } => eprintln!("Error: {message}"),
        DeviceNotification::ConnectionClosed => {
            tx_connection_closed.send(()).unwrap();
        }
    };

    ctrlc::set_handler(move || {
        tx_request_exit.send(()).unwrap();
    })
    .unwrap();

    match Device::connect_path(port_path.clone(), cli.baud, sink, Some(callback)) {
        Ok(device) => {
            println!("Serial port {port_path} open");
            // The device must be kept alive to keep the connection alive; the
            // stdin loop owns it, so closing stdin also winds the session
            // down (via ConnectionClosed).
            thread::spawn(move || {
                for line in std::io::stdin().lines() {
                    let Ok(line) = line else {
                        break;
                    };
                    println!("Received: {line}");
                    device.perform_action(Action::OperatorInput(line));
                }
            });
            rx_done.recv().expect("rx_done failed");
        }
        Err(e) => {
            eprintln!("Failed to open {port_path}: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_selection() {
        assert_eq!(parse_selection("1", 3), Some(0));
        assert_eq!(parse_selection("3", 3), Some(2));
        assert_eq!(parse_selection(" 2 \n", 3), Some(1));
        assert_eq!(parse_selection("0", 3), None, "selection is 1-based");
        assert_eq!(parse_selection("4", 3), None);
        assert_eq!(parse_selection("", 3), None);
        assert_eq!(parse_selection("first", 3), None);
        assert_eq!(parse_selection("-1", 3), None);
        assert_eq!(parse_selection("1", 0), None);
    }

    #[test]
    fn test_default_file_name_shape() {
        let name = default_file_name();
        // YYYYMMDD_HHMMSS_data
        assert_eq!(name.len(), "20240101_000000_data".len());
        assert!(name.ends_with("_data"));
        let (date, rest) = name.split_at(8);
        assert!(date.chars().all(|c| c.is_ascii_digit()));
        assert!(rest.starts_with('_'));
        assert!(rest[1..7].chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["scale-logger"]);
        assert_eq!(cli.baud, DEFAULT_BAUD);
        assert!(cli.port.is_none());
        assert!(cli.output.is_none());
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from([
            "scale-logger",
            "--port",
            "/dev/ttyUSB0",
            "--baud",
            "9600",
            "--output",
            "bench_run",
        ]);
        assert_eq!(cli.port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(cli.baud, 9600);
        assert_eq!(cli.output.as_deref(), Some("bench_run"));
    }
}
