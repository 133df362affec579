//! Group repository commands

use larets_core::Format;
use larets_repo::Engine;

use crate::display;
use crate::error::Result;

/// Add a member and show the resulting resolution order
pub async fn add_member(
    engine: &Engine,
    format: Format,
    group: &str,
    member: &str,
    priority: i32,
    json: bool,
) -> Result<()> {
    let members = engine.add_group_member(format, group, member, priority).await?;

    if json {
        return display::print_json(&members);
    }

    println!("\"{}\" added to group \"{}\"", member, group);
    println!();
    display::member_table(&members);
    Ok(())
}

pub async fn members(engine: &Engine, format: Format, group: &str, json: bool) -> Result<()> {
    let members = engine.group_members(format, group).await?;

    if json {
        return display::print_json(&members);
    }

    if members.is_empty() {
        println!("Group \"{}\" has no members.", group);
        return Ok(());
    }

    display::member_table(&members);
    Ok(())
}

/// Repository a group resolves to
pub async fn resolve(engine: &Engine, format: Format, group: &str, json: bool) -> Result<()> {
    let repo = engine.resolve_group(format, group).await?;

    if json {
        return display::print_json(&repo);
    }

    display::repository_detail(&repo);
    Ok(())
}
