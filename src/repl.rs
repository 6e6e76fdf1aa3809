//! The read-eval-print loop over the command channel.
//!
//! One prompt per line of input; reply lines and recoverable errors go to the
//! same stream. The loop is generic over the byte streams so tests can drive
//! a whole session in memory and assert the exact output, prompts included.

use crate::command::{self, Command, MetaCommand};
use crate::errors::Error;
use crate::storage::table::Table;
use std::io::{BufRead, Write};
use tracing::{info, warn};
use uuid::Uuid;

const PROMPT: &str = "db > ";

/// Runs the REPL until `.exit` or end of input.
///
/// Recoverable errors (parse, validation, duplicate key, table full) are
/// reported on the command channel and the loop keeps going; I/O errors
/// escape to the caller.
pub fn run<R: BufRead, W: Write>(
    table: &mut Table,
    mut input: R,
    mut output: W,
) -> Result<(), Error> {
    let session_id = Uuid::new_v4();
    info!(%session_id, "Starting REPL session...");

    let mut buffer = String::new();
    loop {
        write!(output, "{}", PROMPT)?;
        output.flush()?;

        buffer.clear();
        if input.read_line(&mut buffer)? == 0 {
            // End of input counts as a clean exit.
            break;
        }
        let line = buffer.trim();

        match command::parse(line) {
            Ok(Command::Meta(MetaCommand::Exit)) => break,
            Ok(Command::Meta(meta)) => match command::execute_meta(table, &meta) {
                Ok(lines) => write_lines(&mut output, &lines)?,
                Err(e) => report(&mut output, line, e)?,
            },
            Ok(Command::Statement(statement)) => {
                match command::execute_statement(table, statement) {
                    Ok(lines) => write_lines(&mut output, &lines)?,
                    Err(e) => report(&mut output, line, e)?,
                }
            }
            Err(e) => report(&mut output, line, e)?,
        }
    }

    info!(%session_id, "Closing REPL session.");
    Ok(())
}

fn write_lines<W: Write>(output: &mut W, lines: &[String]) -> Result<(), Error> {
    for line in lines {
        writeln!(output, "{}", line)?;
    }
    Ok(())
}

/// Reports a recoverable error on the command channel. Parse and validation
/// messages are printed verbatim; execution errors get an `Error: ` prefix.
fn report<W: Write>(output: &mut W, input: &str, e: Error) -> Result<(), Error> {
    match e {
        Error::Io(_) => Err(e),
        Error::Syntax(msg) | Error::Schema(msg) => {
            writeln!(output, "{}", msg)?;
            Ok(())
        }
        other => {
            warn!(input, "Statement failed: {}", other);
            writeln!(output, "Error: {}", other)?;
            Ok(())
        }
    }
}
