//! Line-oriented operator console.
//!
//! Reads one command per line and answers with one reply. Management
//! commands go through [`Management`]; line commands address a device by its
//! name and select positions with a list expression.
//!
//! ```text
//! new_device [--delay] <request>    create, reply with the device name
//! delete_device <name>              destroy
//! list                              one row per device
//! get <name> <list>                 read selected positions, reply with bits
//! set <name> <list> <bits>          drive selected positions
//! ramp <name> <line> <rise> <fall>  set a ramp delay, in microseconds
//! help
//! quit
//! ```
//!
//! `<bits>` holds one `0`/`1` per selected position, lowest position first.

use std::fmt;
use std::io::{BufRead, Write};
use std::sync::Arc;

use dio_core::{Direction, LineDevice, LineMask};
use tracing::debug;

use crate::error::{AggregatorError, AggregatorResult};
use crate::forwarder::{Forwarder, ForwarderFeatures};
use crate::management::Management;
use crate::parser::parse_list;
use crate::registry::AggregatorInfo;

const HELP: &str = "\
new_device [--delay] <request>
delete_device <name>
list
get <name> <list>
set <name> <list> <bits>
ramp <name> <line> <rising_us> <falling_us>
help
quit";

/// Reply to one console command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// New device, by name
    Created(String),
    /// Command succeeded
    Ok,
    /// Live aggregators, one row each
    Listing(Vec<AggregatorInfo>),
    /// Line values as `0`/`1`, lowest position first
    Values(String),
    /// Command summary
    Help,
    /// End of session
    Quit,
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Created(name) => write!(f, "{}", name),
            Reply::Ok => write!(f, "ok"),
            Reply::Listing(rows) if rows.is_empty() => write!(f, "(no devices)"),
            Reply::Listing(rows) => {
                for (i, row) in rows.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(
                        f,
                        "{}\t{} lines\t{}{}\t{}",
                        row.name,
                        row.line_count,
                        if row.can_block { "blocking" } else { "spin" },
                        if row.delay { "\tdelay" } else { "" },
                        row.request
                    )?;
                }
                Ok(())
            }
            Reply::Values(bits) => write!(f, "{}", bits),
            Reply::Help => write!(f, "{}", HELP),
            Reply::Quit => write!(f, "bye"),
        }
    }
}

/// Line-oriented command interpreter over a [`Management`] interface.
pub struct Console {
    management: Management,
}

impl Console {
    /// Console driving `management`.
    pub fn new(management: Management) -> Self {
        Self { management }
    }

    /// Execute one command line.
    pub fn execute(&self, line: &str) -> AggregatorResult<Reply> {
        let line = line.trim();
        let (command, rest) = line
            .split_once(char::is_whitespace)
            .map(|(c, r)| (c, r.trim()))
            .unwrap_or((line, ""));
        debug!(command, "Console command");

        match command {
            "new_device" => {
                let (features, request) = match rest.strip_prefix("--delay") {
                    Some(request) => (ForwarderFeatures::DELAY, request),
                    None => (ForwarderFeatures::empty(), rest),
                };
                self.management
                    .new_device_with(request, features)
                    .map(Reply::Created)
            }
            "delete_device" => self.management.delete_device(rest).map(|()| Reply::Ok),
            "list" => Ok(Reply::Listing(self.management.registry().list())),
            "get" => self.get(rest),
            "set" => self.set(rest),
            "ramp" => self.ramp(rest),
            "help" => Ok(Reply::Help),
            "quit" | "exit" => Ok(Reply::Quit),
            "" => Err(AggregatorError::command("empty command")),
            other => Err(AggregatorError::command(format!(
                "unknown command '{}'",
                other
            ))),
        }
    }

    /// Run until `quit` or end of input. Errors are reported and the loop
    /// continues.
    pub fn run<R: BufRead, W: Write>(&self, input: R, mut output: W) -> std::io::Result<()> {
        for line in input.lines() {
            let line = line?;
            if line.trim().is_empty() || line.trim_start().starts_with('#') {
                continue;
            }
            match self.execute(&line) {
                Ok(Reply::Quit) => break,
                Ok(reply) => writeln!(output, "{}", reply)?,
                Err(e) => writeln!(output, "error: {}", e)?,
            }
            output.flush()?;
        }
        Ok(())
    }

    fn device(&self, name: &str) -> AggregatorResult<Arc<Forwarder>> {
        self.management
            .registry()
            .device_by_name(name)
            .ok_or_else(|| AggregatorError::command(format!("no device named '{}'", name)))
    }

    fn selection(device: &Forwarder, list: &str) -> AggregatorResult<LineMask> {
        let positions = parse_list(list)?;
        let count = device.line_count();
        if let Some(&bad) = positions.iter().find(|&&p| p >= count) {
            return Err(AggregatorError::command(format!(
                "position {} out of range for {} lines",
                bad, count
            )));
        }
        Ok(LineMask::from_positions(
            count as usize,
            positions.into_iter().map(|p| p as usize),
        ))
    }

    fn get(&self, args: &str) -> AggregatorResult<Reply> {
        let [name, list] = split_args::<2>(args)?;
        let device = self.device(name)?;
        let mask = Self::selection(&device, list)?;
        let mut bits = LineMask::new(mask.len());
        device.get_multiple(&mask, &mut bits)?;
        let text = mask
            .iter_ones()
            .map(|p| if bits.test(p) { '1' } else { '0' })
            .collect();
        Ok(Reply::Values(text))
    }

    fn set(&self, args: &str) -> AggregatorResult<Reply> {
        let [name, list, values] = split_args::<3>(args)?;
        let device = self.device(name)?;
        let mask = Self::selection(&device, list)?;
        if values.len() != mask.count_ones() {
            return Err(AggregatorError::command(format!(
                "{} values given for {} lines",
                values.len(),
                mask.count_ones()
            )));
        }

        let mut bits = LineMask::new(mask.len());
        for (position, c) in mask.iter_ones().zip(values.chars()) {
            match c {
                '0' => {}
                '1' => bits.set(position),
                _ => {
                    return Err(AggregatorError::command(format!(
                        "bad value '{}', expected 0 or 1",
                        c
                    )))
                }
            }
        }

        for position in mask.iter_ones() {
            ensure_output(device.as_ref(), position as u32)?;
        }
        // A single line goes through `set` so its ramp delay applies.
        if mask.count_ones() == 1 {
            if let Some(position) = mask.iter_ones().next() {
                device.set(position as u32, bits.test(position))?;
            }
        } else {
            device.set_multiple(&mask, &bits)?;
        }
        Ok(Reply::Ok)
    }

    fn ramp(&self, args: &str) -> AggregatorResult<Reply> {
        let [name, line, rising, falling] = split_args::<4>(args)?;
        let device = self.device(name)?;
        let cells = [line, rising, falling]
            .iter()
            .map(|v| {
                v.parse::<u32>()
                    .map_err(|_| AggregatorError::command(format!("'{}' is not a number", v)))
            })
            .collect::<AggregatorResult<Vec<u32>>>()?;
        device.xlate_delay(&cells)?;
        Ok(Reply::Ok)
    }
}

/// Turn an input into an output holding its current level, so the next
/// write is the only edge.
fn ensure_output(device: &Forwarder, position: u32) -> AggregatorResult<()> {
    if device.get_direction(position)? != Direction::Output {
        let level = device.get(position)?;
        device.set_direction_output(position, level)?;
    }
    Ok(())
}

fn split_args<const N: usize>(args: &str) -> AggregatorResult<[&str; N]> {
    let parts: Vec<&str> = args.split_whitespace().collect();
    parts.try_into().map_err(|parts: Vec<&str>| {
        AggregatorError::command(format!("expected {} arguments, got {}", N, parts.len()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::AggregatorRegistry;
    use dio_driver_mock::{MockChipConfig, MockLineProvider};

    fn console() -> (Arc<MockLineProvider>, Console) {
        let provider =
            Arc::new(MockLineProvider::from_configs([MockChipConfig::new("gpio0", 8)]).unwrap());
        let registry = Arc::new(AggregatorRegistry::new(provider.clone()));
        (provider, Console::new(Management::new(registry)))
    }

    #[test]
    fn test_create_set_get_delete() {
        let (provider, console) = console();
        let name = match console.execute("new_device gpio0 2-5").unwrap() {
            Reply::Created(name) => name,
            other => panic!("unexpected reply {:?}", other),
        };
        assert_eq!(name, "dio-aggregator.0");

        assert_eq!(
            console.execute(&format!("set {} 0,2 11", name)).unwrap(),
            Reply::Ok
        );
        let chip = provider.chip("gpio0").unwrap();
        assert_eq!(chip.level(2), Some(true));
        assert_eq!(chip.level(3), Some(false));
        assert_eq!(chip.level(4), Some(true));

        assert_eq!(
            console.execute(&format!("get {} 0-3", name)).unwrap(),
            Reply::Values("1010".into())
        );
        assert_eq!(
            console.execute(&format!("delete_device {}", name)).unwrap(),
            Reply::Ok
        );
        assert_eq!(console.execute("list").unwrap(), Reply::Listing(vec![]));
    }

    #[test]
    fn test_set_edge_comes_from_write() {
        let (provider, console) = console();
        console.execute("new_device gpio0 6-7").unwrap();
        let chip = provider.chip("gpio0").unwrap();

        console.execute("set dio-aggregator.0 0 1").unwrap();
        assert_eq!(chip.level(6), Some(true));
        assert_eq!(chip.line(6).unwrap().write_edges(), 1);

        console.execute("set dio-aggregator.0 0-1 01").unwrap();
        assert_eq!(chip.line(6).unwrap().write_edges(), 2);
        assert_eq!(chip.line(7).unwrap().write_edges(), 1);
        assert_eq!(chip.level(7), Some(true));
    }

    #[test]
    fn test_ramp_command() {
        let (_p, console) = console();
        console.execute("new_device --delay gpio0 0-1").unwrap();
        assert_eq!(
            console.execute("ramp dio-aggregator.0 1 5 7").unwrap(),
            Reply::Ok
        );
        assert!(console.execute("ramp dio-aggregator.0 2 5 7").is_err());
        assert!(console.execute("ramp dio-aggregator.0 x 5 7").is_err());
    }

    #[test]
    fn test_bad_commands() {
        let (_p, console) = console();
        console.execute("new_device gpio0 0").unwrap();
        assert!(console.execute("frobnicate").is_err());
        assert!(console.execute("get dio-aggregator.0").is_err());
        assert!(console.execute("get nope 0").is_err());
        assert!(console.execute("get dio-aggregator.0 1").is_err());
        assert!(console.execute("set dio-aggregator.0 0 2").is_err());
        assert!(console.execute("set dio-aggregator.0 0 11").is_err());
        assert_eq!(console.execute("quit").unwrap(), Reply::Quit);
    }

    #[test]
    fn test_run_loop() {
        let (_p, console) = console();
        let input = b"# setup\nnew_device gpio0 0\nbogus\nlist\nquit\nlist\n";
        let mut output = Vec::new();
        console.run(&input[..], &mut output).unwrap();
        let text = String::from_utf8(output).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "dio-aggregator.0");
        assert!(lines[1].starts_with("error: "));
        assert!(lines[2].starts_with("dio-aggregator.0\t1 lines\tspin"));
        assert_eq!(lines.len(), 3);
    }
}
