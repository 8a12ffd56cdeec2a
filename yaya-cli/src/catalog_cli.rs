//! Catalog listing and editing commands
//!
//! Prints rulesets (or the rules of one ruleset) as tables and drives the
//! toggle prompt for `yaya edit`.

use anyhow::{Context, Result};
use std::io::{self, BufRead, Write};
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

use yaya_core::model::{Rule, Ruleset};
use yaya_core::{EditCommand, EditTarget, ToggleOutcome, Yaya};

#[derive(Tabled)]
struct RulesetRow {
    #[tabled(rename = "ID")]
    id: i64,
    #[tabled(rename = "Status")]
    status: &'static str,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Description")]
    description: String,
}

#[derive(Tabled)]
struct RuleRow {
    #[tabled(rename = "ID")]
    id: i64,
    #[tabled(rename = "Status")]
    status: &'static str,
    #[tabled(rename = "Namespace")]
    namespace: String,
    #[tabled(rename = "Path")]
    path: String,
}

/// `yaya list`
pub fn list_command(yaya: &Yaya, ruleset_id: Option<i64>, json: bool) -> Result<()> {
    let editor = yaya.editor();

    match ruleset_id {
        Some(id) => {
            let rules = editor.rules(id)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&rules)?);
            } else {
                print_rules(&rules);
            }
        }
        None => {
            let rulesets = editor.rulesets()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&rulesets)?);
            } else {
                print_rulesets(&rulesets);
            }
        }
    }

    Ok(())
}

/// `yaya edit`: list, then toggle the given ids or prompt for them
pub fn edit_command(yaya: &Yaya, ruleset_id: Option<i64>, command: EditCommand) -> Result<()> {
    let editor = yaya.editor();

    match ruleset_id {
        Some(id) => print_rules(&editor.rules(id)?),
        None => print_rulesets(&editor.rulesets()?),
    }

    let command = if command.is_empty() {
        prompt_for_ids(command.target)?
    } else {
        command
    };
    let command = match ruleset_id {
        Some(id) => command.within_ruleset(id),
        None => command,
    };

    if command.is_empty() {
        println!("Nothing to change.");
        return Ok(());
    }

    for outcome in yaya.edit(&command)? {
        match outcome {
            ToggleOutcome::Toggled { id, name, enabled } => {
                let state = if enabled { "enabled" } else { "disabled" };
                println!("{id}: {name} is now {state}");
            }
            ToggleOutcome::NotFound { id } => println!("{id}: not found, skipped"),
            ToggleOutcome::OtherRuleset { id, ruleset_id } => {
                println!("{id}: belongs to ruleset {ruleset_id}, skipped")
            }
        }
    }

    Ok(())
}

fn prompt_for_ids(target: EditTarget) -> Result<EditCommand> {
    let noun = match target {
        EditTarget::Rulesets => "rulesets",
        EditTarget::Rules => "rules",
    };
    print!("Enter the ids of the {noun} to toggle, separated by spaces: ");
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read ids from stdin")?;

    Ok(EditCommand::parse(target, &line)?)
}

fn print_rulesets(rulesets: &[Ruleset]) {
    if rulesets.is_empty() {
        println!("No rulesets in the catalog.");
        return;
    }

    let rows: Vec<RulesetRow> = rulesets
        .iter()
        .map(|ruleset| RulesetRow {
            id: ruleset.id,
            status: ruleset.status(),
            name: ruleset.name.clone(),
            description: truncate(&ruleset.description, 60),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Alignment::center()))
        .to_string();

    println!("{table}");
}

fn print_rules(rules: &[Rule]) {
    if rules.is_empty() {
        println!("No rules in this ruleset.");
        return;
    }

    let rows: Vec<RuleRow> = rules
        .iter()
        .map(|rule| RuleRow {
            id: rule.id,
            status: rule.status(),
            namespace: rule.namespace.clone().unwrap_or_else(|| "-".to_string()),
            path: rule.path.display().to_string(),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Alignment::center()))
        .to_string();

    println!("{table}");
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    truncated.push_str("...");
    truncated
}
