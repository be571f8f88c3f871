use anyhow::Context;
use chrono::Utc;
use colored::Colorize;
use dv_editlock::{EditLockRegistry, FileEditLocks, LockInfo};
use dv_store::{DocumentId, DocumentStore, Mutation, SlotId, UpdateOptions};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::cli::*;
use crate::config::FileConfig;

struct Session {
    store: DocumentStore,
    locks: FileEditLocks,
    format: OutputFormat,
}

impl Session {
    fn emit<T: Serialize>(&self, value: &T, text: impl FnOnce()) -> anyhow::Result<()> {
        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
            OutputFormat::Text => text(),
        }
        Ok(())
    }
}

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = FileConfig::load(cli.config.as_deref(), cli.root)?;
    debug!(root = %config.store.root.display(), config = ?cli.config, "configuration loaded");
    let locks = FileEditLocks::new(&config.store.root, &config.editing);
    let store = DocumentStore::open(config.store).context("opening document store")?;
    let ctx = Session {
        store,
        locks,
        format: cli.format,
    };

    match cli.command {
        Command::Show(args) => cmd_show(&ctx, args),
        Command::Set(args) => cmd_set(&ctx, args),
        Command::Edit(args) => cmd_edit(&ctx, args),
        Command::Snapshots(args) => cmd_snapshots(&ctx, args),
        Command::Restore(args) => cmd_restore(&ctx, args),
        Command::Prune(args) => cmd_prune(&ctx, args),
        Command::Lock(args) => cmd_lock(&ctx, args),
        Command::LockStatus(args) => cmd_lock_status(&ctx, args),
        Command::Unlock(args) => cmd_unlock(&ctx, args),
        Command::Locks => cmd_locks(&ctx),
    }
}

fn document(raw: &str) -> anyhow::Result<DocumentId> {
    Ok(DocumentId::new(raw)?)
}

fn parse_value(raw: &str) -> anyhow::Result<Value> {
    serde_json::from_str(raw).with_context(|| format!("{raw:?} is not valid JSON"))
}

fn update_options(args: &CommitArgs) -> UpdateOptions {
    let options = UpdateOptions::new().with_event(args.event.clone());
    if args.tiers.is_empty() {
        options
    } else {
        options.only_tiers(args.tiers.iter().cloned())
    }
}

fn describe(info: &LockInfo) -> String {
    let now = Utc::now();
    format!(
        "{} is editing {} (for {}s, expires in {}s)",
        info.holder.bold(),
        info.document.to_string().yellow(),
        info.age(now).num_seconds(),
        (info.expires_at - now).num_seconds().max(0)
    )
}

fn cmd_show(ctx: &Session, args: DocArgs) -> anyhow::Result<()> {
    let id = document(&args.document)?;
    let value = stored_value(&ctx.store, &id)?;
    if let Some(info) = ctx.locks.inspect(&id, Utc::now())? {
        eprintln!("{} {}", "note:".yellow().bold(), describe(&info));
    }
    ctx.emit(&value, || match &value {
        None => println!("{} {} does not exist", "∅".dimmed(), id.to_string().yellow()),
        Some(stored) => println!("{}", serde_json::to_string_pretty(stored).unwrap_or_default()),
    })
}

/// The stored value, or `None` when the document does not exist. A stored
/// `null` is `Some(Value::Null)`.
fn stored_value(store: &DocumentStore, id: &DocumentId) -> anyhow::Result<Option<Value>> {
    let mut missing = false;
    let value = store.load(id, || {
        missing = true;
        Value::Null
    })?;
    Ok((!missing).then_some(value))
}

fn cmd_set(ctx: &Session, args: SetArgs) -> anyhow::Result<()> {
    let id = document(&args.document)?;
    let value = parse_value(&args.value)?;
    ctx.store
        .update(&id, &update_options(&args.commit), |_| Ok::<_, String>(Mutation::save(value)))?;
    ctx.emit(&json!({"document": id, "committed": true}), || {
        println!("{} Wrote {}", "✓".green().bold(), id.to_string().yellow());
    })
}

fn cmd_edit(ctx: &Session, args: EditArgs) -> anyhow::Result<()> {
    let id = document(&args.document)?;
    let value = parse_value(&args.value)?;
    let previous = ctx.store.update(&id, &update_options(&args.commit), |mut doc| {
        let previous = assign_pointer(&mut doc, &args.pointer, value)?;
        Ok::<_, String>(Mutation::commit(doc, previous))
    })?;
    ctx.emit(
        &json!({"document": id, "pointer": args.pointer, "previous": previous}),
        || {
            println!(
                "{} Set {} in {}",
                "✓".green().bold(),
                args.pointer.bold(),
                id.to_string().yellow()
            );
            if let Some(previous) = &previous {
                println!("  was: {}", previous.to_string().dimmed());
            }
        },
    )
}

fn cmd_snapshots(ctx: &Session, args: DocArgs) -> anyhow::Result<()> {
    let id = document(&args.document)?;
    let snapshots = ctx.store.list_snapshots(&id)?;
    ctx.emit(&snapshots, || {
        if snapshots.is_empty() {
            println!("No snapshots of {}.", id.to_string().yellow());
        }
        for s in &snapshots {
            println!(
                "{:<10} {:<28} {}  {} bytes",
                s.tier.cyan(),
                s.slot.to_string().bold(),
                s.modified.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
                s.len
            );
        }
    })
}

fn cmd_restore(ctx: &Session, args: RestoreArgs) -> anyhow::Result<()> {
    let id = document(&args.document)?;
    let slot = SlotId::new(args.slot);
    ctx.store
        .restore(&id, &slot, &UpdateOptions::new().with_event("restored"))?;
    ctx.emit(&json!({"document": id, "restored": slot}), || {
        println!(
            "{} Restored {} from {}",
            "✓".green().bold(),
            id.to_string().yellow(),
            slot.to_string().bold()
        );
    })
}

fn cmd_prune(ctx: &Session, args: DocArgs) -> anyhow::Result<()> {
    let id = document(&args.document)?;
    let removed = ctx.store.prune(&id)?;
    ctx.emit(&removed, || {
        if removed.is_empty() {
            println!("{} Every tier is within its cap.", "✓".green());
        }
        for slot in &removed {
            println!("  {} {}", "removed:".red(), slot);
        }
    })
}

fn cmd_lock(ctx: &Session, args: HolderArgs) -> anyhow::Result<()> {
    let id = document(&args.document)?;
    let now = Utc::now();
    if let Some(other) = ctx.locks.held_by_other(&id, &args.holder, now)? {
        eprintln!("{} taking over from {}", "warning:".yellow().bold(), other.holder.bold());
    }
    let info = ctx.locks.acquire(&id, &args.holder, now)?;
    ctx.emit(&info, || println!("{} {}", "✓".green().bold(), describe(&info)))
}

fn cmd_lock_status(ctx: &Session, args: DocArgs) -> anyhow::Result<()> {
    let id = document(&args.document)?;
    let info = ctx.locks.inspect(&id, Utc::now())?;
    ctx.emit(&info, || match &info {
        Some(info) => println!("{}", describe(info)),
        None => println!("No one is editing {}.", id.to_string().yellow()),
    })
}

fn cmd_unlock(ctx: &Session, args: HolderArgs) -> anyhow::Result<()> {
    let id = document(&args.document)?;
    let released = ctx.locks.release(&id, &args.holder)?;
    ctx.emit(&json!({"document": id, "released": released}), || {
        if released {
            println!("{} Released {}", "✓".green().bold(), id.to_string().yellow());
        } else {
            println!("{} does not hold {}", args.holder.bold(), id.to_string().yellow());
        }
    })
}

fn cmd_locks(ctx: &Session) -> anyhow::Result<()> {
    let active = ctx.locks.active(Utc::now())?;
    ctx.emit(&active, || {
        if active.is_empty() {
            println!("No active editing locks.");
        }
        for info in &active {
            println!("{}", describe(info));
        }
    })
}

/// Set the value at an RFC 6901 `pointer`, creating the final object key or
/// appending with `-`. Returns the value that was replaced.
fn assign_pointer(doc: &mut Value, pointer: &str, value: Value) -> Result<Option<Value>, String> {
    if pointer.is_empty() {
        return Ok(Some(std::mem::replace(doc, value)));
    }
    let Some((parent, last)) = pointer.rsplit_once('/') else {
        return Err(format!("pointer {pointer:?} must start with '/'"));
    };
    let key = last.replace("~1", "/").replace("~0", "~");
    let target = doc
        .pointer_mut(parent)
        .ok_or_else(|| format!("nothing at {parent:?}"))?;

    match target {
        Value::Object(map) => Ok(map.insert(key, value)),
        Value::Array(items) if key == "-" => {
            items.push(value);
            Ok(None)
        }
        Value::Array(items) => {
            let index: usize = key
                .parse()
                .map_err(|_| format!("{key:?} is not an array index"))?;
            let len = items.len();
            match items.get_mut(index) {
                Some(slot) => Ok(Some(std::mem::replace(slot, value))),
                None if index == len => {
                    items.push(value);
                    Ok(None)
                }
                None => Err(format!("index {index} is past the end of {parent:?}")),
            }
        }
        other => bail_value(parent, other),
    }
}

fn bail_value<T>(parent: &str, found: &Value) -> Result<T, String> {
    let kind = match found {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) | Value::Object(_) => "a container",
    };
    Err(format!("{parent:?} is {kind}, not an object or array"))
}
