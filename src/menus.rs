//! Setup menus shipped with the shell.
//!
//! `setup_menu` groups `config` (inspect and persist the running
//! configuration) and `set` (toggle shell settings). Attach it to a tree by
//! listing [`SETUP_MENU`] as a child type.

use crate::builtin::{self, BuiltinCommand, SetDebug, Toggle};
use crate::command::{Command, Context, Flow};
use crate::env::Environment;
use crate::error::Result;
use crate::node::NodeType;
use argh::FromArgs;

pub const SETUP_MENU: &str = "SetupMenu";
pub const SETUP_CONFIG_MENU: &str = "SetupConfigMenu";
pub const SETUP_SET_MENU: &str = "SetupSetMenu";

/// Register the setup menu types.
pub fn register_setup_menus(env: &mut Environment) -> Result<()> {
    env.register_type(
        NodeType::new(SETUP_MENU, "setup_menu")
            .summary("Shell Setup Menu")
            .description("Shell Setup Menu")
            .intro("*** Shell Setup Menu ***")
            .child(SETUP_CONFIG_MENU)
            .child(SETUP_SET_MENU),
    )?;
    env.register_type(
        NodeType::new(SETUP_CONFIG_MENU, "config")
            .summary("Shell Setup Config Menu")
            .intro("*** Shell Setup Config Menu ***")
            .command(
                Command::new(
                    "show",
                    "Show the current running configuration\nUsage: show [section]",
                    show_config,
                )
                .completer(|env, _args, partial| {
                    env.config()
                        .section_names()
                        .filter(|name| name.starts_with(partial))
                        .map(String::from)
                        .collect()
                }),
            )
            .command(Command::new(
                "diff",
                "Show the diff between running and saved configuration",
                |ctx, _| {
                    let diff = ctx.env.config_diff()?;
                    if diff.is_empty() {
                        ctx.print("No unsaved configuration changes")
                    } else {
                        ctx.print(&diff)
                    }
                },
            ))
            .command(Command::new(
                "save",
                "Save the running configuration to the config file",
                |ctx, _| {
                    ctx.env.save_config()?;
                    let path = ctx
                        .env
                        .config()
                        .path()
                        .map(|p| p.display().to_string())
                        .unwrap_or_default();
                    ctx.print(&format!("Configuration saved to {path}"))
                },
            )),
    )?;
    env.register_type(
        NodeType::new(SETUP_SET_MENU, "set")
            .summary("Shell Setup Set Menu")
            .intro("*** Shell Setup Set Menu ***")
            .command(builtin::builtin::<SetDebug>())
            .command(builtin::builtin::<PageBreak>()),
    )?;
    Ok(())
}

fn show_config(ctx: &mut Context<'_>, args: &str) -> anyhow::Result<()> {
    let section = Some(args.trim()).filter(|s| !s.is_empty());
    let text = match (ctx.env.config().formatted(section), section) {
        (Some(text), _) => text,
        (None, Some(section)) => format!("\"{section}\" configuration block not found"),
        (None, None) => String::new(),
    };
    ctx.print(&text)
}

#[derive(FromArgs)]
/// Enable or disable output pagination.
pub(crate) struct PageBreak {
    #[argh(positional)]
    /// on or off
    pub state: Toggle,
}

impl BuiltinCommand for PageBreak {
    fn name() -> &'static str {
        "pagebreak"
    }

    fn doc() -> &'static str {
        "Enables/disables paginated output\nUsage: pagebreak on|off"
    }

    fn execute(self, ctx: &mut Context<'_>) -> anyhow::Result<Flow> {
        ctx.env.set_page_break(self.state.is_on());
        ctx.print(&format!("pagebreak is {}", self.state))?;
        Ok(Flow::Continue)
    }
}
