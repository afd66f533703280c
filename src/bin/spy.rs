extern crate serialport;
use std::io::BufRead;

use scalelog::DEFAULT_BAUD;

fn main() {
    eprintln!(
        "scale spy (v{}). (This binary simply dumps the scale's raw serial output, with no parsing or recording - useful when bringing up a new device.)",
        env!("CARGO_PKG_VERSION")
    );

    let Some(device) = std::env::args().nth(1) else {
        eprintln!("\nusage: spy <device>\n");
        eprintln!("Available ports:");
        match serialport::available_ports() {
            Ok(ports) => {
                for port in ports {
                    eprintln!("  {}", port.port_name);
                }
            }
            Err(e) => eprintln!("  (failed to list ports: {e})"),
        }
        return;
    };

    let port = serialport::new(device.as_str(), DEFAULT_BAUD)
        .data_bits(serialport::DataBits::Eight)
        .parity(serialport::Parity::None)
        .stop_bits(serialport::StopBits::One)
        // Very long timeout, because the scale might send nothing while idle.
        .timeout(core::time::Duration::from_secs(60 * 60 * 24))
        .open()
        .expect("Unable to open serial port, sorry");

    let reader = std::io::BufReader::new(port);

    for line in reader.lines() {
        println!("{}", line.unwrap().trim());
    }
}
