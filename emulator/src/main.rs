mod session;

use std::env;
use std::io::{self, BufRead, IsTerminal, Write};
use std::process;

use crossterm::style::Stylize;
use meter_core::wakeup::WakeIntervalCode;
use session::{NodeSetup, Session, SoilProfile};

const USAGE: &str = "\
Usage: meter-emulator [<drying|watering>] [options]

Options:
  --profile <drying|watering>  soil the simulated probe follows
  --device-id <n>              stored device id
  --threshold <n>              stored moisture threshold (dry count)
  --factor <n>                 stored averaging factor
  --wake-code <n>              stored wake-timer register (decimal or 0x hex)
  --counter <n>                stored packet counter

Stored values go through the same sanitizing as flash; rejected ones are
listed as config faults at boot.";

/// Command-line selection of soil profile and stored node state.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct Options {
    profile: SoilProfile,
    setup: NodeSetup,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            profile: SoilProfile::Drying,
            setup: NodeSetup::default(),
        }
    }
}

fn main() -> io::Result<()> {
    let options = parse_options(env::args().skip(1)).unwrap_or_else(|err| {
        eprintln!("{err}");
        eprintln!("{USAGE}");
        process::exit(2);
    });

    let stdin = io::stdin();
    let mut reader = stdin.lock();
    let stdout = io::stdout();
    let colored = stdout.is_terminal();
    let mut writer = stdout.lock();
    let mut session = Session::new(options.profile, options.setup)?;
    let mut line = String::new();

    writeln!(
        writer,
        "Soil moisture node 0x{:04X} on {} soil. Type `help` for commands or `exit` to quit.",
        options.setup.config.device_id,
        options.profile.tag()
    )?;
    for banner in session.boot_banner()? {
        writeln!(writer, "{}", paint(&banner, colored))?;
    }

    loop {
        line.clear();
        write!(writer, "meter> ")?;
        writer.flush()?;

        if reader.read_line(&mut line)? == 0 {
            writeln!(writer)?;
            break;
        }

        let command = line.trim();
        if command.is_empty() {
            continue;
        }
        if is_exit(command) {
            writeln!(writer, "Node powered off.")?;
            break;
        }

        for response in session.handle_command(command)? {
            writeln!(writer, "{}", paint(&response, colored))?;
        }
    }

    Ok(())
}

/// Highlights acknowledgements, radio traffic, config faults, and errors on a terminal.
fn paint(line: &str, colored: bool) -> String {
    if !colored {
        return line.to_string();
    }
    if line.starts_with("ERR") {
        line.red().to_string()
    } else if line.starts_with("config fault") {
        line.yellow().to_string()
    } else if line.starts_with("TX") {
        line.cyan().to_string()
    } else if line.starts_with("OK") {
        line.green().to_string()
    } else {
        line.to_string()
    }
}

fn is_exit(input: &str) -> bool {
    input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit")
}

fn parse_options<I>(args: I) -> Result<Options, String>
where
    I: IntoIterator<Item = String>,
{
    let mut options = Options::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        let (flag, inline) = match arg.split_once('=') {
            Some((flag, value)) if flag.starts_with("--") => {
                (flag.to_string(), Some(value.to_string()))
            }
            _ => (arg.clone(), None),
        };
        if !flag.starts_with("--") {
            options.profile = SoilProfile::from_tag(&flag)?;
            continue;
        }

        let value = match inline {
            Some(value) => value,
            None => args
                .next()
                .ok_or_else(|| format!("Expected value after {flag}"))?,
        };
        let config = &mut options.setup.config;
        match flag.as_str() {
            "--profile" => options.profile = SoilProfile::from_tag(&value)?,
            "--device-id" => config.device_id = parse_number(&flag, &value)?,
            "--threshold" => config.moisture_threshold = parse_number(&flag, &value)?,
            "--factor" => config.averaging_factor = parse_number(&flag, &value)?,
            "--wake-code" => {
                config.wake_interval = WakeIntervalCode::new(parse_number(&flag, &value)?);
            }
            "--counter" => options.setup.sequence_counter = parse_number(&flag, &value)?,
            _ => return Err(format!("Unknown option `{flag}`")),
        }
    }

    Ok(options)
}

/// Parses a decimal or `0x`-prefixed hexadecimal value.
fn parse_number<N>(flag: &str, value: &str) -> Result<N, String>
where
    N: TryFrom<u64>,
{
    let parsed = match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => value.parse::<u64>(),
    };
    parsed
        .ok()
        .and_then(|raw| N::try_from(raw).ok())
        .ok_or_else(|| format!("Invalid value `{value}` for {flag}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use meter_core::config::{ConfigFault, DEFAULT_MOISTURE_THRESHOLD};

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|arg| (*arg).to_string()).collect()
    }

    #[test]
    fn defaults_to_drying_with_stock_config() {
        assert_eq!(parse_options(args(&[])), Ok(Options::default()));
    }

    #[test]
    fn positional_and_flag_profiles() {
        let positional = parse_options(args(&["watering"])).unwrap();
        assert_eq!(positional.profile, SoilProfile::Watering);

        let inline = parse_options(args(&["--profile=Watering"])).unwrap();
        assert_eq!(inline.profile, SoilProfile::Watering);
    }

    #[test]
    fn stored_values_are_overridden() {
        let options = parse_options(args(&[
            "--device-id",
            "0x31",
            "--threshold=36000",
            "--factor",
            "4",
            "--wake-code",
            "0x0569",
            "--counter",
            "4210",
        ]))
        .unwrap();

        let config = options.setup.config;
        assert_eq!(config.device_id, 0x31);
        assert_eq!(config.moisture_threshold, 36_000);
        assert_eq!(config.averaging_factor, 4);
        assert_eq!(config.wake_interval, WakeIntervalCode::from_parts(105, 5));
        assert_eq!(options.setup.sequence_counter, 4_210);
    }

    #[test]
    fn unusable_stored_values_surface_as_faults() {
        let options =
            parse_options(args(&["--threshold", "0", "--wake-code", "0x0500"])).unwrap();
        let (config, faults) = options.setup.config.sanitized();

        assert_eq!(config.moisture_threshold, DEFAULT_MOISTURE_THRESHOLD);
        assert_eq!(
            faults.as_slice(),
            &[
                ConfigFault::ThresholdDefaulted { stored: 0 },
                ConfigFault::WakeIntervalDefaulted { stored: 0x0500 },
            ]
        );
    }

    #[test]
    fn bad_arguments_are_rejected() {
        assert!(parse_options(args(&["--factor", "70000"])).is_err());
        assert!(parse_options(args(&["--wake-code"])).is_err());
        assert!(parse_options(args(&["--volume", "3"])).is_err());
        assert!(parse_options(args(&["swamp"])).is_err());
    }
}
