//! Parsing and execution of the line command surface.
//!
//! Each input line is either a meta-command (leading `.`) that controls the
//! session or a statement against the table. Execution returns the reply
//! lines so the REPL owns all writing to the command channel.

use crate::errors::Error;
use crate::storage::btree::{
    COMMON_NODE_HEADER_SIZE, LEAF_NODE_CELL_SIZE, LEAF_NODE_HEADER_SIZE, LEAF_NODE_MAX_CELLS,
    LEAF_NODE_SPACE_FOR_CELLS,
};
use crate::storage::row::{Row, ROW_SIZE};
use crate::storage::table::{self, Table};
use once_cell::sync::Lazy;

#[derive(Debug, PartialEq)]
pub enum MetaCommand {
    Exit,
    Btree,
    Constants,
}

#[derive(Debug, PartialEq)]
pub enum Statement {
    Insert(Row),
    Select,
}

#[derive(Debug, PartialEq)]
pub enum Command {
    Meta(MetaCommand),
    Statement(Statement),
}

/// The `.constants` reply; pinned so the test suite notices layout drift.
static CONSTANT_LINES: Lazy<Vec<String>> = Lazy::new(|| {
    vec![
        format!("ROW_SIZE: {}", ROW_SIZE),
        format!("COMMON_NODE_HEADER_SIZE: {}", COMMON_NODE_HEADER_SIZE),
        format!("LEAF_NODE_HEADER_SIZE: {}", LEAF_NODE_HEADER_SIZE),
        format!("LEAF_NODE_CELL_SIZE: {}", LEAF_NODE_CELL_SIZE),
        format!("LEAF_NODE_SPACE_FOR_CELLS: {}", LEAF_NODE_SPACE_FOR_CELLS),
        format!("LEAF_NODE_MAX_CELLS: {}", LEAF_NODE_MAX_CELLS),
    ]
});

/// Parses one input line.
pub fn parse(input: &str) -> Result<Command, Error> {
    if input.starts_with('.') {
        parse_meta(input).map(Command::Meta)
    } else {
        parse_statement(input).map(Command::Statement)
    }
}

fn parse_meta(input: &str) -> Result<MetaCommand, Error> {
    match input {
        ".exit" => Ok(MetaCommand::Exit),
        ".btree" => Ok(MetaCommand::Btree),
        ".constants" => Ok(MetaCommand::Constants),
        _ => Err(err!(Syntax, "Unrecognized command '{}'.", input)),
    }
}

fn parse_statement(input: &str) -> Result<Statement, Error> {
    let mut tokens = input.split_whitespace();
    match tokens.next() {
        Some("insert") => {
            let (id, username, email) = match (tokens.next(), tokens.next(), tokens.next()) {
                (Some(id), Some(username), Some(email)) => (id, username, email),
                _ => return Err(err!(Syntax, "Syntax error.")),
            };
            let id: i64 = id.parse().map_err(|_| err!(Syntax, "Syntax error."))?;
            Ok(Statement::Insert(Row::build(id, username, email)?))
        }
        Some("select") => Ok(Statement::Select),
        _ => Err(err!(Syntax, "Unrecognized command '{}'.", input)),
    }
}

/// Executes a statement and returns its reply lines.
pub fn execute_statement(table: &mut Table, statement: Statement) -> Result<Vec<String>, Error> {
    match statement {
        Statement::Insert(row) => {
            table::insert_row(table, &row)?;
            Ok(vec!["Executed.".to_string()])
        }
        Statement::Select => {
            let mut lines: Vec<String> = table::select_rows(table)?
                .iter()
                .map(|row| row.to_string())
                .collect();
            lines.push("Executed.".to_string());
            Ok(lines)
        }
    }
}

/// Executes an introspection meta-command and returns its reply lines.
/// `.exit` never reaches this point; the REPL intercepts it.
pub fn execute_meta(table: &mut Table, meta: &MetaCommand) -> Result<Vec<String>, Error> {
    match meta {
        MetaCommand::Exit => Ok(Vec::new()),
        MetaCommand::Btree => {
            let mut lines = vec!["Tree:".to_string()];
            lines.extend(table::render_tree(table)?);
            Ok(lines)
        }
        MetaCommand::Constants => {
            let mut lines = vec!["Constants:".to_string()];
            lines.extend(CONSTANT_LINES.iter().cloned());
            Ok(lines)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_meta_commands() {
        assert_eq!(parse(".exit").unwrap(), Command::Meta(MetaCommand::Exit));
        assert_eq!(parse(".btree").unwrap(), Command::Meta(MetaCommand::Btree));
        assert_eq!(
            parse(".constants").unwrap(),
            Command::Meta(MetaCommand::Constants)
        );
    }

    #[test]
    fn test_unrecognized_meta_command() {
        let err = parse(".tables").unwrap_err();
        assert_eq!(err.to_string(), "Unrecognized command '.tables'.");
    }

    #[test]
    fn test_parse_insert() {
        let command = parse("insert 1 user1 person1@example.com").unwrap();
        let expected = Row::build(1, "user1", "person1@example.com").unwrap();
        assert_eq!(command, Command::Statement(Statement::Insert(expected)));
    }

    #[test]
    fn test_insert_with_missing_arguments_is_a_syntax_error() {
        let err = parse("insert 1 user1").unwrap_err();
        assert_eq!(err.to_string(), "Syntax error.");
    }

    #[test]
    fn test_insert_with_non_numeric_id_is_a_syntax_error() {
        let err = parse("insert abc user1 a@b.c").unwrap_err();
        assert_eq!(err.to_string(), "Syntax error.");
    }

    #[test]
    fn test_insert_with_negative_id_is_rejected_before_storage() {
        let err = parse("insert -1 user1 a@b.c").unwrap_err();
        assert_eq!(err.to_string(), "ID must be positive.");
    }

    #[test]
    fn test_unrecognized_statement_keyword() {
        let err = parse("update 1").unwrap_err();
        assert_eq!(err.to_string(), "Unrecognized command 'update 1'.");
    }

    #[test]
    fn test_constant_lines_pin_the_layout() {
        assert_eq!(
            *CONSTANT_LINES,
            vec![
                "ROW_SIZE: 293",
                "COMMON_NODE_HEADER_SIZE: 6",
                "LEAF_NODE_HEADER_SIZE: 14",
                "LEAF_NODE_CELL_SIZE: 297",
                "LEAF_NODE_SPACE_FOR_CELLS: 4082",
                "LEAF_NODE_MAX_CELLS: 13",
            ]
        );
    }
}
