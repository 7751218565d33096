use anyhow::{Context as _, Result};
use argh::FromArgs;
use menu_shell::env::{SHELL_SECTION, shell_defaults};
use menu_shell::menus::{SETUP_MENU, register_setup_menus};
use menu_shell::{Command, ConfigStore, Environment, Interpreter, NodeType, ShellError};
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

const ROOT_MENU: &str = "HomeMenu";

#[derive(FromArgs)]
/// Hierarchical menu-driven command shell.
struct Args {
    /// configuration file (default: <config dir>/menu_shell/config.json)
    #[argh(option)]
    config: Option<PathBuf>,

    /// directory scanned for menu_*.json plugins
    #[argh(option)]
    plugins: Option<PathBuf>,

    /// command history file
    #[argh(option)]
    history: Option<PathBuf>,

    /// show full error chains and debug logs
    #[argh(switch)]
    debug: bool,

    /// never paginate output
    #[argh(switch)]
    no_page_break: bool,
}

fn main() -> ExitCode {
    let args: Args = argh::from_env();
    init_tracing(args.debug);
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = ?e, "fatal");
            eprintln!("menu_shell: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(debug: bool) {
    let default = if debug {
        "menu_shell=debug"
    } else {
        "menu_shell=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn run(args: Args) -> Result<()> {
    let base_dir = dirs::config_dir()
        .context("no configuration directory on this platform")?
        .join("menu_shell");
    std::fs::create_dir_all(&base_dir)
        .with_context(|| format!("cannot create {}", base_dir.display()))?;

    let mut store = ConfigStore::open(
        args.config
            .clone()
            .unwrap_or_else(|| base_dir.join("config.json")),
    );
    let load_error = store.load_section(SHELL_SECTION, shell_defaults()).err();
    let mut env = Environment::new(store);
    if let Some(e) = load_error {
        tracing::warn!(error = %e, "using default shell settings");
        env.eprint(&format!("{e}; using default settings"))?;
    }
    apply_overrides(&mut env, &args, &base_dir);

    register_demo_menus(&mut env)?;
    register_setup_menus(&mut env)?;

    if let Some(dir) = env.plugin_dir().filter(|d| d.is_dir()) {
        if let Err(e) = env.load_plugins(&dir) {
            tracing::warn!(error = %e, "plugin directory unreadable");
            env.eprint(&e.to_string())?;
        }
        env.report_unresolved_attachments();
    }

    if let Err(e) = env.cancel_token().install_ctrlc_handler() {
        tracing::warn!(error = %e, "Ctrl-C handler not installed");
    }

    let mut shell = Interpreter::new(env, ROOT_MENU)?;
    tracing::info!(prompt = %shell.prompt(), "shell ready");
    if io::stdin().is_terminal() {
        shell.repl()
    } else {
        shell.run_script(io::stdin().lock())
    }
}

/// Command-line settings win over the configuration file for this run only.
fn apply_overrides(env: &mut Environment, args: &Args, base_dir: &std::path::Path) {
    let history = args
        .history
        .clone()
        .or_else(|| env.history_file())
        .unwrap_or_else(|| base_dir.join("history"));
    let plugins = args
        .plugins
        .clone()
        .or_else(|| env.plugin_dir())
        .unwrap_or_else(|| base_dir.join("plugins"));

    let config = env.config_mut();
    config.set_transient(SHELL_SECTION, "history_file", history.display().to_string());
    config.set_transient(SHELL_SECTION, "plugin_dir", plugins.display().to_string());
    if args.debug {
        config.set_transient(SHELL_SECTION, "debug", true);
    }
    if args.no_page_break {
        config.set_transient(SHELL_SECTION, "page_break", false);
    }
}

fn register_demo_menus(env: &mut Environment) -> Result<(), ShellError> {
    env.register_type(
        NodeType::new(ROOT_MENU, "home")
            .summary("Home Menu")
            .intro("*** home ***\nType '?' for the menu summary, '<name>?' for help")
            .child("ServicesMenu")
            .child("TestsMenu")
            .child(SETUP_MENU),
    )?;
    env.register_type(
        NodeType::new("ServicesMenu", "services")
            .summary("Services Menu")
            .child("NetworkMenu")
            .command(Command::new(
                "show_services",
                "Prints the current state of services",
                |ctx, _| ctx.print("network: running\nstorage: running\nimages: stopped"),
            )),
    )?;
    env.register_type(
        NodeType::new("NetworkMenu", "network")
            .summary("Network Menu")
            .command(Command::new(
                "show",
                "Show network interfaces\nUsage: show [interface]",
                |ctx, args| {
                    let interfaces = [("lo", "127.0.0.1"), ("eth0", "10.0.0.12")];
                    let wanted = args.trim();
                    let rows: Vec<String> = interfaces
                        .iter()
                        .filter(|(name, _)| wanted.is_empty() || *name == wanted)
                        .map(|(name, addr)| format!("{name:<8}{addr}"))
                        .collect();
                    if rows.is_empty() {
                        return Err(ShellError::input(format!("show: no interface '{wanted}'")).into());
                    }
                    ctx.print(&rows.join("\n"))
                },
            )
            .completer(|_, _, partial| {
                ["lo", "eth0"]
                    .iter()
                    .filter(|name| name.starts_with(partial))
                    .map(|name| name.to_string())
                    .collect()
            })),
    )?;
    env.register_type(
        NodeType::new("TestsMenu", "tests_menu")
            .summary("Tests Menu")
            .command(Command::new(
                "output_test",
                "Sample command for test purposes\n\
                 Usage: output_test x [y]\n\
                 x: printed to stdout\n\
                 y: printed to stderr",
                |ctx, args| {
                    let mut words = args.split_whitespace();
                    let out = words.next().unwrap_or("test_stdout");
                    ctx.print(&format!("This is printed to stdout:{out}"))?;
                    let err = if args.trim().is_empty() {
                        Some("test_stderr")
                    } else {
                        words.next()
                    };
                    if let Some(err) = err {
                        ctx.eprint(&format!("This is printed to stderr:{err}"))?;
                    }
                    Ok(())
                },
            ))
            .command(Command::new(
                "long_output",
                "Print numbered lines to try the pager\nUsage: long_output [count]",
                |ctx, args| {
                    let count: usize = match args.trim() {
                        "" => 200,
                        n => n
                            .parse()
                            .map_err(|_| ShellError::input(format!("long_output: bad count '{n}'")))?,
                    };
                    let text: String = (1..=count).map(|i| format!("line {i}\n")).collect();
                    ctx.print(&text)
                },
            )),
    )?;
    Ok(())
}
