//! Interactive REPL for the msgops MCP server.
//!
//! Launch with `msgops-mcp repl`. Type `/help` for commands, Tab to
//! complete commands and tool names. `/call` runs a tool through the same
//! dispatcher the server uses, so `--backend memory` makes a safe sandbox.

use rustyline::completion::{Completer, Pair};
use rustyline::config::CompletionType;
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{
    Cmd, ConditionalEventHandler, Config, Editor, Event, EventContext, EventHandler, Helper,
    KeyEvent, RepeatCount,
};
use serde_json::Value;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use msgops::{Dispatcher, Operation};

use crate::config::{Overrides, ServerConfig};
use crate::tools::ToolRegistry;

/// Available REPL commands.
const COMMANDS: &[(&str, &str)] = &[
    ("/tools", "List available MCP tools"),
    ("/info", "Show server capabilities and resolved configuration"),
    ("/check", "Make one read-only call against the backend"),
    ("/call", "Run a tool: /call <tool> [json arguments]"),
    ("/clear", "Clear the screen"),
    ("/help", "Show available commands"),
    ("/exit", "Quit the REPL"),
];

/// REPL helper for tab completion.
#[derive(Default)]
struct MsgopsHelper;

impl Completer for MsgopsHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let input = &line[..pos];

        if !input.contains(' ') {
            let matches: Vec<Pair> = COMMANDS
                .iter()
                .filter(|(cmd, _)| cmd.starts_with(input))
                .map(|(cmd, desc)| Pair {
                    display: format!("{cmd:<16} {desc}"),
                    replacement: format!("{cmd} "),
                })
                .collect();
            return Ok((0, matches));
        }

        if let Some(partial) = input.strip_prefix("/call ") {
            if partial.contains(' ') {
                return Ok((pos, Vec::new()));
            }
            let start = input.len() - partial.len();
            let matches: Vec<Pair> = Operation::ALL
                .iter()
                .map(|op| op.as_str())
                .filter(|name| name.starts_with(partial))
                .map(|name| Pair {
                    display: name.to_string(),
                    replacement: format!("{name} "),
                })
                .collect();
            return Ok((start, matches));
        }

        Ok((pos, Vec::new()))
    }
}

impl Hinter for MsgopsHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &rustyline::Context<'_>) -> Option<String> {
        if pos < line.len() || line.is_empty() {
            return None;
        }
        if line.starts_with('/') && !line.contains(' ') {
            for (cmd, _) in COMMANDS {
                if cmd.starts_with(line) && *cmd != line {
                    return Some(cmd[line.len()..].to_string());
                }
            }
        }
        None
    }
}

impl Highlighter for MsgopsHelper {}
impl Validator for MsgopsHelper {}
impl Helper for MsgopsHelper {}

struct TabCompleteOrAcceptHint;

impl ConditionalEventHandler for TabCompleteOrAcceptHint {
    fn handle(
        &self,
        _evt: &Event,
        _n: RepeatCount,
        _positive: bool,
        ctx: &EventContext<'_>,
    ) -> Option<Cmd> {
        if ctx.has_hint() {
            Some(Cmd::CompleteHint)
        } else {
            Some(Cmd::Complete)
        }
    }
}

/// Session state.
struct ReplState {
    config: ServerConfig,
    dispatcher: Option<Dispatcher>,
    runtime: Handle,
}

impl ReplState {
    /// Connect on first use so `/help` and `/tools` work offline.
    fn dispatcher(&mut self) -> Option<&Dispatcher> {
        if self.dispatcher.is_none() {
            match self.runtime.block_on(self.config.build_dispatcher()) {
                Ok(dispatcher) => self.dispatcher = Some(dispatcher),
                Err(e) => {
                    eprintln!("  Cannot reach backend: {e}");
                    return None;
                }
            }
        }
        self.dispatcher.as_ref()
    }
}

/// Run the interactive REPL.
///
/// Must run on a multi-threaded tokio runtime, inside `block_in_place`.
pub fn run(overrides: Overrides) -> anyhow::Result<()> {
    let config = ServerConfig::resolve(overrides)?;

    eprintln!();
    eprintln!(
        "  \x1b[32m\u{25c9}\x1b[0m \x1b[1mmsgops-mcp v{}\x1b[0m \x1b[90m({} backend, {})\x1b[0m",
        env!("CARGO_PKG_VERSION"),
        config.backend,
        config.region
    );
    eprintln!();
    eprintln!(
        "    Press \x1b[36m/\x1b[0m to browse commands, \x1b[90mTab\x1b[0m to complete, \x1b[90m/exit\x1b[0m to quit."
    );
    eprintln!();

    let rl_config = Config::builder()
        .history_ignore_space(true)
        .auto_add_history(true)
        .completion_type(CompletionType::List)
        .completion_prompt_limit(30)
        .build();

    let mut rl: Editor<MsgopsHelper, rustyline::history::DefaultHistory> =
        Editor::with_config(rl_config)?;
    rl.set_helper(Some(MsgopsHelper));
    rl.bind_sequence(
        KeyEvent::from('\t'),
        EventHandler::Conditional(Box::new(TabCompleteOrAcceptHint)),
    );

    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    let hist_path = std::path::PathBuf::from(&home).join(".msgops_mcp_history");
    if hist_path.exists() {
        let _ = rl.load_history(&hist_path);
    }

    let mut state = ReplState {
        config,
        dispatcher: None,
        runtime: Handle::current(),
    };
    let prompt = " \x1b[36mmsgops>\x1b[0m ";

    loop {
        match rl.readline(prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let input = line.strip_prefix('/').unwrap_or(line);
                if input.is_empty() {
                    cmd_help();
                    continue;
                }

                let mut parts = input.splitn(2, ' ');
                let cmd = parts.next().unwrap_or("");
                let args = parts.next().unwrap_or("").trim();

                match cmd {
                    "exit" | "quit" => {
                        eprintln!("  Goodbye!");
                        break;
                    }
                    "help" | "h" | "?" => cmd_help(),
                    "clear" | "cls" => eprint!("\x1b[2J\x1b[H"),
                    "info" => cmd_info(&state),
                    "tools" => cmd_tools(),
                    "check" => cmd_call("list-queues", r#"{"page_size": 1}"#, &mut state),
                    "call" => {
                        let mut call_parts = args.splitn(2, ' ');
                        let tool = call_parts.next().unwrap_or("");
                        let json = call_parts.next().unwrap_or("").trim();
                        if tool.is_empty() {
                            eprintln!("  Usage: /call <tool> [json arguments]");
                        } else {
                            cmd_call(tool, json, &mut state);
                        }
                    }
                    _ => {
                        eprintln!("  Unknown command '/{cmd}'. Type /help for commands.");
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                eprintln!("  \x1b[90m(Ctrl+C)\x1b[0m Type \x1b[1m/exit\x1b[0m to quit.");
            }
            Err(ReadlineError::Eof) => {
                eprintln!("  Goodbye!");
                break;
            }
            Err(err) => {
                eprintln!("  Error: {err}");
                break;
            }
        }
    }

    let _ = rl.save_history(&hist_path);

    Ok(())
}

fn cmd_help() {
    eprintln!();
    eprintln!("  Commands:");
    eprintln!();
    for (cmd, desc) in COMMANDS {
        eprintln!("    {cmd:<18} {desc}");
    }
    eprintln!();
    eprintln!("  Example: /call create-queue {{\"queue_name\": \"orders\"}}");
    eprintln!();
}

fn cmd_info(state: &ReplState) {
    let config = &state.config;
    let capabilities = crate::types::InitializeResult::for_config(&config.dispatcher_config());
    eprintln!();
    eprintln!(
        "  Server:   {} v{}",
        capabilities.server_info.name, capabilities.server_info.version
    );
    eprintln!("  Protocol: {}", capabilities.protocol_version);
    eprintln!("  Tools:    {}", Operation::ALL.len());
    eprintln!("  Backend:  {} ({})", config.backend, config.region);
    if let Some(endpoint) = &config.endpoint_url {
        eprintln!("  Endpoint: {endpoint}");
    }
    eprintln!(
        "  Guard:    {}",
        if config.allow_unmanaged { "off" } else { "on" }
    );
    eprintln!();
}

fn cmd_tools() {
    let tools = ToolRegistry::list_tools();
    eprintln!();
    eprintln!("  {} MCP tools available:", tools.len());
    eprintln!();
    for tool in &tools {
        let read_only = tool
            .annotations
            .as_ref()
            .is_some_and(|a| a.read_only_hint);
        eprintln!(
            "    {:<22} {}{}",
            tool.name,
            if read_only { "\x1b[90m(read-only)\x1b[0m " } else { "" },
            tool.description.as_deref().unwrap_or("")
        );
    }
    eprintln!();
}

fn cmd_call(tool: &str, json: &str, state: &mut ReplState) {
    let arguments: Value = if json.is_empty() {
        Value::Object(serde_json::Map::new())
    } else {
        match serde_json::from_str(json) {
            Ok(value) => value,
            Err(e) => {
                eprintln!("  Arguments are not valid JSON: {e}");
                return;
            }
        }
    };

    let runtime = state.runtime.clone();
    let Some(dispatcher) = state.dispatcher() else {
        return;
    };
    let result = runtime.block_on(dispatcher.call(tool, arguments, &CancellationToken::new()));
    match serde_json::to_string_pretty(&result) {
        Ok(text) => println!("{text}"),
        Err(e) => eprintln!("  Cannot print result: {e}"),
    }
}
