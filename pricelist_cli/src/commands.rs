//! Parsing of the interactive command line.
//!
//! Arguments that may contain spaces (names, units) are separated with `|`:
//!
//! ```text
//! add Pipa Tembaga 1/2" | 85000 | meter
//! edit 2 Pipa Tembaga 3/4" | 95000 | meter
//! markup 2 27.5
//! ```
//!
//! Materials are addressed by their row number in the table or by id.

use std::path::PathBuf;

use anyhow::{anyhow, bail, Result};
use pricelist_core::material::MaterialId;
use pricelist_core::presentation::Dashboard;
use pricelist_core::validation::{EditableField, MaterialInput};

pub const HELP: &str = "\
Commands:
  add <name> | <price> | <unit>        add a material with the default markup and margin
  markup <row> <percent>               change a material's markup
  margin <row> <percent>               change a material's profit margin
  price <row> <amount>                 change a material's real price
  rename <row> <name>                  change a material's name
  unit <row> <unit>                    change a material's unit
  set <row> <field> <value>            change any editable field
  edit <row> <name> | <price> | <unit> change name, price and unit together
  delete <row>                         delete a material
  apply [<markup> <margin>]            apply markup and margin to every material
  settings [<markup> <margin>]         show or change the defaults
  export [<dir>]                       write pricelist-YYYY-MM-DD.json
  import <file>                        replace all data with an export file
  clear                                delete all materials
  sample                               add sample materials to an empty list
  retry                                send unsynced materials again
  show                                 redraw the table
  help                                 show this help
  quit                                 leave";

/// A material reference as typed: row number or id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target(pub String);

impl Target {
    /// Row numbers (1-based) win over ids that happen to look numeric.
    pub fn resolve(&self, dashboard: &Dashboard) -> Result<MaterialId> {
        if let Ok(row) = self.0.trim_start_matches('#').parse::<usize>() {
            return row
                .checked_sub(1)
                .and_then(|i| dashboard.rows.get(i))
                .and_then(|r| r.id.clone())
                .ok_or_else(|| anyhow!("There is no row {}", row));
        }
        Ok(MaterialId::new(self.0.clone()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Add(MaterialInput),
    SetField {
        target: Target,
        field: EditableField,
        value: String,
    },
    Edit {
        target: Target,
        name: String,
        price: String,
        unit: String,
    },
    Delete(Target),
    /// Without values the current defaults are applied
    Apply(Option<(String, String)>),
    Settings(Option<(String, String)>),
    Export(Option<PathBuf>),
    Import(PathBuf),
    Clear,
    Sample,
    Retry,
    Show,
    Help,
    Quit,
}

impl Command {
    pub fn parse(line: &str) -> Result<Option<Command>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        let command = match word.to_ascii_lowercase().as_str() {
            "add" => {
                let [name, price, unit] = split_fields(rest, "add <name> | <price> | <unit>")?;
                Command::Add(MaterialInput::new(name, price, unit))
            }
            "markup" => field_command(rest, EditableField::Markup)?,
            "margin" => field_command(rest, EditableField::ProfitMargin)?,
            "price" => field_command(rest, EditableField::RealPrice)?,
            "rename" => field_command(rest, EditableField::Name)?,
            "unit" => field_command(rest, EditableField::Unit)?,
            "set" => {
                let usage = || anyhow!("Usage: set <row> <field> <value>");
                let (target, rest) = take_word(rest).ok_or_else(usage)?;
                let (field, value) = take_word(rest).ok_or_else(usage)?;
                Command::SetField {
                    target: Target(target.to_string()),
                    field: field.parse()?,
                    value: value.to_string(),
                }
            }
            "edit" => {
                const USAGE: &str = "edit <row> <name> | <price> | <unit>";
                let (target, rest) = take_word(rest).ok_or_else(|| anyhow!("Usage: {}", USAGE))?;
                let [name, price, unit] = split_fields(rest, USAGE)?;
                Command::Edit {
                    target: Target(target.to_string()),
                    name,
                    price,
                    unit,
                }
            }
            "delete" | "rm" => {
                if rest.is_empty() {
                    bail!("Usage: delete <row>");
                }
                Command::Delete(Target(rest.to_string()))
            }
            "apply" => Command::Apply(pair(rest, "apply [<markup> <margin>]")?),
            "settings" => Command::Settings(pair(rest, "settings [<markup> <margin>]")?),
            "export" => Command::Export((!rest.is_empty()).then(|| PathBuf::from(rest))),
            "import" => {
                if rest.is_empty() {
                    bail!("Usage: import <file>");
                }
                Command::Import(PathBuf::from(rest))
            }
            "clear" => Command::Clear,
            "sample" => Command::Sample,
            "retry" => Command::Retry,
            "show" | "ls" => Command::Show,
            "help" | "?" => Command::Help,
            "quit" | "exit" | "q" => Command::Quit,
            other => bail!("Unknown command '{}'. Type 'help' for a list.", other),
        };
        Ok(Some(command))
    }
}

fn take_word(text: &str) -> Option<(&str, &str)> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    Some(match text.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (text, ""),
    })
}

fn field_command(rest: &str, field: EditableField) -> Result<Command> {
    match take_word(rest) {
        Some((target, value)) if !value.is_empty() => Ok(Command::SetField {
            target: Target(target.to_string()),
            field,
            value: value.to_string(),
        }),
        _ => bail!("Usage: {} <row> <value>", field),
    }
}

fn split_fields(rest: &str, usage: &str) -> Result<[String; 3]> {
    let parts: Vec<String> = rest.split('|').map(|p| p.trim().to_string()).collect();
    match <[String; 3]>::try_from(parts) {
        Ok(fields) => Ok(fields),
        Err(_) => bail!("Usage: {}", usage),
    }
}

fn pair(rest: &str, usage: &str) -> Result<Option<(String, String)>> {
    let words: Vec<&str> = rest.split_whitespace().collect();
    match words.as_slice() {
        [] => Ok(None),
        [a, b] => Ok(Some((a.to_string(), b.to_string()))),
        _ => bail!("Usage: {}", usage),
    }
}
