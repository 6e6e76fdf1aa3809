//! End-to-end REPL sessions asserting the exact command-channel byte stream,
//! prompts included.

use std::path::Path;
use tempfile::TempDir;
use tinydb::repl;
use tinydb::storage::table::Table;

/// Runs a script of commands through a fresh session over the database at
/// `path` and returns the output split into lines.
fn run_script(path: &Path, commands: &[&str]) -> Vec<String> {
    let mut table = Table::open(path).unwrap();
    let input = commands.join("\n") + "\n";
    let mut output = Vec::new();
    repl::run(&mut table, input.as_bytes(), &mut output).unwrap();
    table.close().unwrap();
    String::from_utf8(output)
        .unwrap()
        .split('\n')
        .map(str::to_string)
        .collect()
}

fn db_path(dir: &TempDir) -> std::path::PathBuf {
    dir.path().join("test.db")
}

#[test]
fn test_inserts_and_retrieves_a_row() {
    let dir = TempDir::new().unwrap();
    let result = run_script(
        &db_path(&dir),
        &["insert 1 user1 person1@example.com", "select", ".exit"],
    );
    assert_eq!(
        result,
        vec![
            "db > Executed.",
            "db > (1, user1, person1@example.com)",
            "Executed.",
            "db > ",
        ]
    );
}

#[test]
fn test_select_on_an_empty_table() {
    let dir = TempDir::new().unwrap();
    let result = run_script(&db_path(&dir), &["select", ".exit"]);
    assert_eq!(result, vec!["db > Executed.", "db > "]);
}

#[test]
fn test_allows_maximum_length_strings() {
    let dir = TempDir::new().unwrap();
    let username = "a".repeat(32);
    let email = "b".repeat(255);
    let insert = format!("insert 1 {} {}", username, email);
    let result = run_script(&db_path(&dir), &[&insert, "select", ".exit"]);
    assert_eq!(
        result,
        vec![
            "db > Executed.".to_string(),
            format!("db > (1, {}, {})", username, email),
            "Executed.".to_string(),
            "db > ".to_string(),
        ]
    );
}

#[test]
fn test_rejects_strings_that_are_too_long() {
    let dir = TempDir::new().unwrap();
    let username = "a".repeat(33);
    let insert = format!("insert 1 {} b@c.d", username);
    let result = run_script(&db_path(&dir), &[&insert, "select", ".exit"]);
    assert_eq!(
        result,
        vec!["db > String is too long.", "db > Executed.", "db > "]
    );
}

#[test]
fn test_rejects_negative_ids() {
    let dir = TempDir::new().unwrap();
    let result = run_script(
        &db_path(&dir),
        &["insert -1 cstack foo@bar.com", "select", ".exit"],
    );
    assert_eq!(
        result,
        vec!["db > ID must be positive.", "db > Executed.", "db > "]
    );
}

#[test]
fn test_rejects_duplicate_ids() {
    let dir = TempDir::new().unwrap();
    let result = run_script(
        &db_path(&dir),
        &[
            "insert 1 user1 person1@example.com",
            "insert 1 user1 person1@example.com",
            "select",
            ".exit",
        ],
    );
    assert_eq!(
        result,
        vec![
            "db > Executed.",
            "db > Error: Duplicate key.",
            "db > (1, user1, person1@example.com)",
            "Executed.",
            "db > ",
        ]
    );
}

#[test]
fn test_reports_syntax_errors() {
    let dir = TempDir::new().unwrap();
    let result = run_script(&db_path(&dir), &["insert 1 user1", ".exit"]);
    assert_eq!(result, vec!["db > Syntax error.", "db > "]);
}

#[test]
fn test_reports_unrecognized_meta_commands() {
    let dir = TempDir::new().unwrap();
    let result = run_script(&db_path(&dir), &[".foo", ".exit"]);
    assert_eq!(result, vec!["db > Unrecognized command '.foo'.", "db > "]);
}

#[test]
fn test_reports_unrecognized_statements() {
    let dir = TempDir::new().unwrap();
    let result = run_script(&db_path(&dir), &["update 1", ".exit"]);
    assert_eq!(result, vec!["db > Unrecognized command 'update 1'.", "db > "]);
}

#[test]
fn test_prints_constants() {
    let dir = TempDir::new().unwrap();
    let result = run_script(&db_path(&dir), &[".constants", ".exit"]);
    assert_eq!(
        result,
        vec![
            "db > Constants:",
            "ROW_SIZE: 293",
            "COMMON_NODE_HEADER_SIZE: 6",
            "LEAF_NODE_HEADER_SIZE: 14",
            "LEAF_NODE_CELL_SIZE: 297",
            "LEAF_NODE_SPACE_FOR_CELLS: 4082",
            "LEAF_NODE_MAX_CELLS: 13",
            "db > ",
        ]
    );
}

#[test]
fn test_prints_the_structure_of_a_one_node_btree() {
    let dir = TempDir::new().unwrap();
    let mut commands: Vec<String> = [3, 1, 2]
        .iter()
        .map(|i| format!("insert {} user{} person{}@example.com", i, i, i))
        .collect();
    commands.push(".btree".to_string());
    commands.push(".exit".to_string());
    let commands: Vec<&str> = commands.iter().map(String::as_str).collect();

    let result = run_script(&db_path(&dir), &commands);
    assert_eq!(
        result,
        vec![
            "db > Executed.",
            "db > Executed.",
            "db > Executed.",
            "db > Tree:",
            "- leaf (size 3)",
            "  - 1",
            "  - 2",
            "  - 3",
            "db > ",
        ]
    );
}

#[test]
fn test_prints_the_structure_of_a_three_leaf_node_btree() {
    let dir = TempDir::new().unwrap();
    let mut commands: Vec<String> = (1..=14)
        .map(|i| format!("insert {} user{} person{}@example.com", i, i, i))
        .collect();
    commands.push(".btree".to_string());
    commands.push(".exit".to_string());
    let commands: Vec<&str> = commands.iter().map(String::as_str).collect();

    let result = run_script(&db_path(&dir), &commands);

    let mut expected: Vec<String> = (1..=14).map(|_| "db > Executed.".to_string()).collect();
    expected.push("db > Tree:".to_string());
    expected.push("- internal (size 1)".to_string());
    expected.push("  - leaf (size 7)".to_string());
    for key in 1..=7 {
        expected.push(format!("    - {}", key));
    }
    expected.push("  - key 7".to_string());
    expected.push("  - leaf (size 7)".to_string());
    for key in 8..=14 {
        expected.push(format!("    - {}", key));
    }
    expected.push("db > ".to_string());

    assert_eq!(result, expected);
}

#[test]
fn test_keeps_data_after_closing_connection() {
    let dir = TempDir::new().unwrap();
    let db = db_path(&dir);

    let mut commands: Vec<String> = (1..=15)
        .map(|i| format!("insert {} user{} person{}@example.com", i, i, i))
        .collect();
    commands.push(".exit".to_string());
    let commands: Vec<&str> = commands.iter().map(String::as_str).collect();
    let result = run_script(&db, &commands);
    assert_eq!(result.len(), 16);
    assert!(result[..15].iter().all(|line| line == "db > Executed."));

    let result = run_script(&db, &["select", ".exit"]);
    let mut expected: Vec<String> = (1..=15)
        .map(|i| format!("({}, user{}, person{}@example.com)", i, i, i))
        .collect();
    expected[0] = format!("db > {}", expected[0]);
    expected.push("Executed.".to_string());
    expected.push("db > ".to_string());
    assert_eq!(result, expected);
}

#[test]
fn test_scans_a_multi_level_tree_in_key_order_across_sessions() {
    let dir = TempDir::new().unwrap();
    let db = db_path(&dir);

    // Enough sequential inserts to split internal nodes, not just leaves.
    let mut commands: Vec<String> = (1..=64)
        .map(|i| format!("insert {} user{} person{}@example.com", i, i, i))
        .collect();
    commands.push(".exit".to_string());
    let commands: Vec<&str> = commands.iter().map(String::as_str).collect();
    let result = run_script(&db, &commands);
    assert!(result[..64].iter().all(|line| line == "db > Executed."));

    let result = run_script(&db, &["select", ".exit"]);
    let mut expected: Vec<String> = (1..=64)
        .map(|i| format!("({}, user{}, person{}@example.com)", i, i, i))
        .collect();
    expected[0] = format!("db > {}", expected[0]);
    expected.push("Executed.".to_string());
    expected.push("db > ".to_string());
    assert_eq!(result, expected);
}

#[test]
fn test_end_of_input_is_a_clean_exit() {
    let dir = TempDir::new().unwrap();
    // No .exit; the stream just ends.
    let result = run_script(&db_path(&dir), &["insert 1 user1 person1@example.com"]);
    assert_eq!(result, vec!["db > Executed.", "db > "]);

    let result = run_script(&db_path(&dir), &["select", ".exit"]);
    assert_eq!(
        result,
        vec![
            "db > (1, user1, person1@example.com)",
            "Executed.",
            "db > ",
        ]
    );
}
