use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use pagedeck_core::{Mutation, Rotation};

pub const HELP: &str = "\
select N        select page N only
extend N        extend the selection from the anchor to page N
toggle N        add or remove page N
all | clear     select every page / nothing
rotate [DEG]    rotate selected pages clockwise (90, 180 or 270; default 90)
duplicate       duplicate selected pages
remove          remove selected pages
swap A B        exchange pages A and B
move FROM TO    move one page
order N...      reorder: list all page numbers in their new order
undo | redo
open PATH | close [!]
save | save-as PATH
status | help | quit";

/// One line of input. Page numbers are 1-based on the way in and stored 0-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Select(usize),
    Extend(usize),
    Toggle(usize),
    SelectAll,
    ClearSelection,
    Edit(Mutation),
    Swap(usize, usize),
    Move { from: usize, to: usize },
    Undo,
    Redo,
    Open(PathBuf),
    Close { force: bool },
    Save,
    SaveAs(PathBuf),
    Status,
    Help,
    Quit,
}

pub fn parse_line(line: &str) -> Result<Option<Action>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let mut words = line.split_whitespace();
    let verb = words.next().unwrap_or_default();
    let args: Vec<&str> = words.collect();

    let action = match (verb, args.as_slice()) {
        ("select", [page]) => Action::Select(page_index(page)?),
        ("extend", [page]) => Action::Extend(page_index(page)?),
        ("toggle", [page]) => Action::Toggle(page_index(page)?),
        ("all", []) => Action::SelectAll,
        ("clear", []) => Action::ClearSelection,
        ("rotate", []) => Action::Edit(Mutation::Rotate(Rotation::Clockwise90)),
        ("rotate", [degrees]) => {
            let degrees: i64 = degrees
                .parse()
                .with_context(|| format!("invalid rotation {:?}", degrees))?;
            Action::Edit(Mutation::Rotate(Rotation::try_from(degrees)?))
        }
        ("duplicate", []) => Action::Edit(Mutation::Duplicate),
        ("remove", []) => Action::Edit(Mutation::Remove),
        ("swap", [first, second]) => Action::Swap(page_index(first)?, page_index(second)?),
        ("move", [from, to]) => Action::Move {
            from: page_index(from)?,
            to: page_index(to)?,
        },
        ("order", pages) if !pages.is_empty() => {
            let order = pages
                .iter()
                .map(|page| page_index(page))
                .collect::<Result<Vec<_>>>()?;
            Action::Edit(Mutation::Reorder(order))
        }
        ("undo", []) => Action::Undo,
        ("redo", []) => Action::Redo,
        ("open", [path]) => Action::Open(PathBuf::from(path)),
        ("close", []) => Action::Close { force: false },
        ("close", ["!"]) => Action::Close { force: true },
        ("save", []) => Action::Save,
        ("save-as", [path]) => Action::SaveAs(PathBuf::from(path)),
        ("status", []) => Action::Status,
        ("help" | "?", []) => Action::Help,
        ("quit" | "exit", []) => Action::Quit,
        _ => bail!("unrecognised command {:?} (try `help`)", line),
    };
    Ok(Some(action))
}

fn page_index(word: &str) -> Result<usize> {
    let number: usize = word
        .parse()
        .with_context(|| format!("invalid page number {:?}", word))?;
    number
        .checked_sub(1)
        .ok_or_else(|| anyhow!("page numbers start at 1"))
}
