use crate::command::{Command, CommandTable, Context, Flow};
use crate::dispatcher::render_prompt;
use crate::error::ShellError;
use anyhow::{Context as _, Result};
use argh::{EarlyExit, FromArgs};
use std::fmt;
use std::str::FromStr;

const UNSAVED_CONFIG: &str = "Configuration has not been saved.\n\
    Save now or use 'quit force' to quit without saving,\n\
    or 'quit saveall' to save upon quit";

/// Commands present in every menu node.
///
/// Builtins with arguments are parsed using the [`argh`] crate (`FromArgs`);
/// a parse failure becomes a [`ShellError::UserInput`] carrying argh's message.
pub(crate) trait BuiltinCommand: Sized + FromArgs {
    /// Canonical name of the command, e.g. "quit" or "debug".
    fn name() -> &'static str;

    /// Help text shown by `help <name>`; the first line goes in summaries.
    fn doc() -> &'static str;

    fn execute(self, ctx: &mut Context<'_>) -> Result<Flow>;
}

/// Wrap `T` into a table entry.
pub(crate) fn builtin<T: BuiltinCommand + 'static>() -> Command {
    Command::with_flow(T::name(), T::doc(), |ctx, args| {
        let argv: Vec<&str> = args.split_whitespace().collect();
        match T::from_args(&[T::name()], &argv) {
            Ok(cmd) => cmd.execute(ctx),
            Err(EarlyExit { output, status }) => match status {
                Ok(()) => {
                    ctx.print(&output)?;
                    Ok(Flow::Continue)
                }
                Err(()) => Err(ShellError::input(output.trim_end()).into()),
            },
        }
    })
}

/// The base command table every node starts from.
pub(crate) fn base_commands() -> CommandTable {
    let mut table = CommandTable::new();
    let commands = [
        builtin::<Help>(),
        Command::with_flow("back", "Go back one level in menu tree", |_, _| Ok(Flow::Back)),
        Command::with_flow("home", "Return to the home menu of the cli", |_, _| {
            Ok(Flow::Home)
        }),
        builtin::<Quit>(),
        Command::new("clear", "Clear current screen", |ctx, _| {
            Ok(ctx.env.clear_screen()?)
        }),
        Command::new("cli_env", "Show current cli environment variables", cli_env),
        builtin::<SetDebug>(),
        Command::new("ls", "Alias of help", |ctx, args| {
            show_help(ctx, args.split_whitespace().next())
        })
        .hidden(),
        Command::with_flow("cd", "Go home, or back with '..' or '-'", cd).hidden(),
        builtin::<Exit>().hidden(),
    ];
    for command in commands {
        table.insert(command.base());
    }
    table
}

/// Print the node summary, or help for `word`.
pub(crate) fn show_help(ctx: &mut Context<'_>, word: Option<&str>) -> Result<()> {
    let node = ctx.node.clone();
    let text = match word {
        None => node.render_summary(),
        Some(word) => node
            .help_for(word)
            .unwrap_or_else(|| format!("*** No help on {word}")),
    };
    ctx.print(&text)
}

/// Quit, refusing when the running configuration has unsaved changes.
///
/// `force` wins over `save_all`: a forced quit never writes the configuration.
pub(crate) fn request_quit(ctx: &mut Context<'_>, force: bool, save_all: bool) -> Result<Flow> {
    if !force {
        if save_all {
            if ctx.env.config().path().is_some() {
                ctx.env.save_config()?;
            }
        } else {
            let diff = ctx
                .env
                .config_diff()
                .context("cannot compare the running configuration, use 'quit force'")?;
            if !diff.is_empty() {
                tracing::debug!(%diff, "quit refused");
                ctx.eprint(UNSAVED_CONFIG)?;
                return Ok(Flow::Continue);
            }
        }
    }
    ctx.print("Quitting.")?;
    Ok(Flow::Quit)
}

#[derive(FromArgs)]
/// Show the menu summary, or help on one command or sub-menu.
pub(crate) struct Help {
    #[argh(positional)]
    /// command or sub-menu name
    pub word: Option<String>,
}

impl BuiltinCommand for Help {
    fn name() -> &'static str {
        "help"
    }

    fn doc() -> &'static str {
        "Show the menu summary, or help on a command\nUsage: help [name]"
    }

    fn execute(self, ctx: &mut Context<'_>) -> Result<Flow> {
        show_help(ctx, self.word.as_deref())?;
        Ok(Flow::Continue)
    }
}

#[derive(FromArgs)]
/// Quit the program.
pub(crate) struct Quit {
    #[argh(positional, greedy)]
    /// force to quit without saving, saveall to save the configuration first
    pub words: Vec<String>,
}

impl BuiltinCommand for Quit {
    fn name() -> &'static str {
        "quit"
    }

    fn doc() -> &'static str {
        "Quits the program.\nUsage: quit [force] [saveall]\n\
         force: quit without saving the configuration\n\
         saveall: save the configuration, then quit"
    }

    fn execute(self, ctx: &mut Context<'_>) -> Result<Flow> {
        let mut force = false;
        let mut save_all = false;
        for word in &self.words {
            match word.to_ascii_lowercase().as_str() {
                "force" => force = true,
                "saveall" => save_all = true,
                _ => {
                    return Err(ShellError::input(format!(
                        "quit: unknown option '{word}', use 'force' or 'saveall'"
                    ))
                    .into());
                }
            }
        }
        request_quit(ctx, force, save_all)
    }
}

#[derive(FromArgs)]
/// Quit immediately without saving.
pub(crate) struct Exit {
    #[argh(positional, greedy)]
    /// ignored
    pub _args: Vec<String>,
}

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        "exit"
    }

    fn doc() -> &'static str {
        "Quit without saving"
    }

    fn execute(self, ctx: &mut Context<'_>) -> Result<Flow> {
        request_quit(ctx, true, false)
    }
}

/// `on` or `off`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Toggle {
    On,
    Off,
}

impl Toggle {
    pub fn is_on(self) -> bool {
        self == Toggle::On
    }
}

impl FromStr for Toggle {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "on" => Ok(Toggle::On),
            "off" => Ok(Toggle::Off),
            other => Err(format!("\"{other}\", Invalid arg. Use \"on/off\"")),
        }
    }
}

impl fmt::Display for Toggle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.is_on() { "on" } else { "off" })
    }
}

#[derive(FromArgs)]
/// Enable or disable debug output.
pub(crate) struct SetDebug {
    #[argh(positional)]
    /// on or off
    pub state: Toggle,
}

impl BuiltinCommand for SetDebug {
    fn name() -> &'static str {
        "debug"
    }

    fn doc() -> &'static str {
        "Enables/disables the global debug flag\nUsage: debug on|off"
    }

    fn execute(self, ctx: &mut Context<'_>) -> Result<Flow> {
        ctx.env.set_debug(self.state.is_on());
        tracing::info!(state = %self.state, "debug toggled");
        ctx.print(&format!("debug is {}", self.state))?;
        Ok(Flow::Continue)
    }
}

fn cd(_ctx: &mut Context<'_>, args: &str) -> Result<Flow> {
    match args.trim() {
        "" => Ok(Flow::Home),
        ".." | "-" => Ok(Flow::Back),
        other => Err(ShellError::input(format!(
            "cd: '{other}' is not supported, type the sub-menu name to enter it"
        ))
        .into()),
    }
}

fn cli_env(ctx: &mut Context<'_>, _args: &str) -> Result<()> {
    let names: Vec<&str> = ctx.path.iter().map(|n| n.name()).collect();
    let submenus: Vec<&str> = ctx.node.children().iter().map(|c| c.name.as_str()).collect();
    let mut buf = format!(
        "CURRENT MENU: \"{}\" ({})\n\
         PROMPT: \"{}\"\n\
         PATH FROM HOME: \"{}\"\n\
         SUB MENUS: \"{}\"\n\
         CONFIG FILE: \"{}\"\n\
         CLI CONFIG JSON:\n",
        ctx.node.name(),
        ctx.node.type_name(),
        render_prompt(ctx.env, &names),
        names.join(","),
        submenus.join(", "),
        ctx.env
            .config()
            .path()
            .map(|p| p.display().to_string())
            .unwrap_or_default(),
    );
    buf.push_str(&ctx.env.config().formatted(None).unwrap_or_default());
    ctx.print(&buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle_parsing() {
        assert_eq!("ON".parse::<Toggle>(), Ok(Toggle::On));
        assert_eq!(" off ".parse::<Toggle>(), Ok(Toggle::Off));
        assert!("maybe".parse::<Toggle>().unwrap_err().contains("on/off"));
    }

    #[test]
    fn test_base_table_contents() {
        let table = base_commands();
        for name in ["help", "back", "home", "quit", "clear", "cli_env", "debug"] {
            let cmd = table.get(name).unwrap();
            assert!(!cmd.is_hidden(), "{name} should be listed");
        }
        for name in ["ls", "cd", "exit"] {
            assert!(table.get(name).unwrap().is_hidden(), "{name} should be hidden");
        }
        assert!(
            table
                .visible()
                .all(|c| c.category() == crate::command::Category::Base)
        );
    }

    #[test]
    fn test_argh_parses_quit_words() {
        let quit = Quit::from_args(&["quit"], &["force", "saveall"]).unwrap();
        assert_eq!(quit.words, vec!["force", "saveall"]);
        let debug = SetDebug::from_args(&["debug"], &["on"]).unwrap();
        assert_eq!(debug.state, Toggle::On);
        assert!(SetDebug::from_args(&["debug"], &[]).is_err());
    }
}
