mod board;
mod command;
mod session;

use std::env;
use std::io::{self, BufRead, Write};
use std::process;

use session::{Session, TranscriptProfile};

fn main() -> io::Result<()> {
    let profile = parse_profile().unwrap_or_else(|err| {
        eprintln!("{err}");
        eprintln!("Usage: bringup-emulator [--profile <interactive|a|b|c|d|e>]");
        for scenario in TranscriptProfile::SCENARIOS {
            eprintln!("  {}", scenario.header());
        }
        process::exit(2);
    });

    let stdin = io::stdin();
    let mut reader = stdin.lock();
    let stdout = io::stdout();
    let mut writer = stdout.lock();
    let mut session = Session::new(profile)?;
    let mut line = String::new();

    writeln!(
        writer,
        "tlc32 bring-up emulator ready. Type `help` for commands or `exit` to quit."
    )?;

    for scripted in profile.script() {
        writeln!(writer, "> {scripted}")?;
        for response in session.handle_command(scripted)? {
            writeln!(writer, "{response}")?;
        }
    }

    loop {
        line.clear();
        write!(writer, "> ")?;
        writer.flush()?;

        if reader.read_line(&mut line)? == 0 {
            writeln!(writer)?;
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if should_terminate(trimmed) {
            writeln!(writer, "Session closed.")?;
            break;
        }

        for response in session.handle_command(trimmed)? {
            writeln!(writer, "{response}")?;
        }
    }

    Ok(())
}

fn should_terminate(input: &str) -> bool {
    input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit")
}

fn parse_profile() -> Result<TranscriptProfile, String> {
    let mut args = env::args().skip(1);
    match args.next() {
        None => Ok(TranscriptProfile::Interactive),
        Some(arg) => {
            if let Some(value) = arg.strip_prefix("--profile=") {
                TranscriptProfile::from_tag(value)
            } else if arg == "--profile" {
                args.next()
                    .ok_or_else(|| "Expected value after --profile".to_string())
                    .and_then(|value| TranscriptProfile::from_tag(&value))
            } else {
                TranscriptProfile::from_tag(&arg)
            }
        }
    }
}
