//! Command line for the `wavy-bird` binary.

pub const HELP: &str = "\
Wavy Bird - accelerometer and keyboard input front end

USAGE:
  wavy-bird [OPTIONS]

OPTIONS:
  -h, --help            Prints help information
  --port <path>         Serial port to open (default: first enumerated port)
  --baud <rate>         Baud rate (default: 115200, older firmware uses 9600)
  --replay <file>       Read device lines from a capture file instead of a port
  --connect             Connect to the device at start-up
  --list-ports          Print the available serial ports and exit

KEYS:
  space / up / w        flap
  left, right / a, d    tilt
  -                     connect or disconnect the device
  =                     calibrate the device
  q / esc / ctrl-c      quit

ENVIRONMENT:
  WAVY_SERIAL_PORT, WAVY_SERIAL_BAUD, WAVY_SERIAL_DISABLED,
  WAVY_SERIAL_LOG_PATH, WAVY_LOG_PATH, RUST_LOG
";

#[derive(Debug, Default, PartialEq, Eq)]
pub struct AppArgs {
    pub help: bool,
    pub port: Option<String>,
    pub baud_rate: Option<u32>,
    pub replay: Option<String>,
    pub connect: bool,
    pub list_ports: bool,
}

impl AppArgs {
    /// `--baud` wins over the configured rate.
    pub fn baud_rate_or(&self, configured: u32) -> u32 {
        self.baud_rate.unwrap_or(configured)
    }
}

pub fn parse_args() -> Result<AppArgs, pico_args::Error> {
    parse_from(pico_args::Arguments::from_env())
}

pub fn parse_from(mut pargs: pico_args::Arguments) -> Result<AppArgs, pico_args::Error> {
    let args = AppArgs {
        help: pargs.contains(["-h", "--help"]),
        port: pargs.opt_value_from_str("--port")?,
        baud_rate: pargs.opt_value_from_str("--baud")?,
        replay: pargs.opt_value_from_str("--replay")?,
        connect: pargs.contains("--connect"),
        list_ports: pargs.contains("--list-ports"),
    };

    let remaining = pargs.finish();
    if !remaining.is_empty() {
        eprintln!("Warning: unused arguments left: {:?}.", remaining);
    }

    Ok(args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;

    fn parse(args: &[&str]) -> Result<AppArgs, pico_args::Error> {
        parse_from(pico_args::Arguments::from_vec(
            args.iter().map(OsString::from).collect(),
        ))
    }

    #[test]
    fn test_no_arguments() {
        assert_eq!(parse(&[]).unwrap(), AppArgs::default());
    }

    #[test]
    fn test_port_baud_and_connect() {
        let args = parse(&["--port", "/dev/ttyACM0", "--baud", "9600", "--connect"]).unwrap();
        assert_eq!(args.port.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(args.baud_rate, Some(9600));
        assert!(args.connect);
        assert!(!args.list_ports);
    }

    #[test]
    fn test_bad_baud_is_an_error() {
        assert!(parse(&["--baud", "fast"]).is_err());
    }

    #[test]
    fn test_baud_rate_precedence() {
        let args = parse(&["--baud", "9600"]).unwrap();
        assert_eq!(args.baud_rate_or(57_600), 9600);
        assert_eq!(AppArgs::default().baud_rate_or(57_600), 57_600);
    }
}
