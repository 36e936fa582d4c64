//! Operator menu rendering and answer parsing.

use std::fmt::Write as _;

use crate::protocol::{CommandTable, Group};

/// Words accepted to leave the menu
pub const EXIT_WORDS: &[&str] = &["exit", "quit", "q", "sair"];

#[derive(Copy, Clone, PartialEq, Debug)]
pub enum Selection {
    Command(u32),
    Exit,
}

/// Menu listing primary then supplementary commands
pub fn render(table: &CommandTable) -> String {
    let mut s = String::new();

    let _ = writeln!(s, "\nSelect an actuation:\n");
    for e in table.group(Group::Primary) {
        let _ = writeln!(s, "    {}. {}", e.id, e.description);
    }

    let _ = writeln!(s, "\nSupplementary:\n");
    for e in table.group(Group::Supplementary) {
        let _ = writeln!(s, "    {}. {}", e.id, e.description);
    }

    let _ = writeln!(s, "\nEnter 'exit' to quit.");

    s
}

/// Parse a menu selection, `None` if it names no command
pub fn parse_selection(input: &str, table: &CommandTable) -> Option<Selection> {
    let input = input.trim();

    if EXIT_WORDS.iter().any(|w| input.eq_ignore_ascii_case(w)) {
        return Some(Selection::Exit);
    }

    input
        .parse::<u32>()
        .ok()
        .filter(|id| table.get(*id).is_some())
        .map(Selection::Command)
}

/// Parse a yes/no answer, `None` if it is neither
pub fn parse_confirmation(input: &str) -> Option<bool> {
    match input.trim().to_lowercase().as_str() {
        "y" | "yes" | "s" | "sim" => Some(true),
        "n" | "no" | "nao" | "não" => Some(false),
        _ => None,
    }
}
