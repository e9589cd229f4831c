//! Interactive REPL for the Store Counter MCP server.
//!
//! Launch with `store-counter-mcp repl`. Sessions live in memory for the
//! lifetime of the REPL; type `/help` for commands, Tab for completion.

use std::path::Path;

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
use store_counter::{
    AgeBand, BucketLogReader, DetectionEvent, EngineConfig, Gender, SceneState, SessionId,
    SessionRegistry, SourceKind,
};

use crate::replay::replay_file;
use crate::tools::ToolRegistry;

/// Available REPL commands.
const COMMANDS: &[(&str, &str)] = &[
    ("/start", "Start a session (webcam | upload)"),
    ("/ingest", "Ingest one detection: <track> <ms> <age> [gender]"),
    ("/load", "Replay a .jsonl detection file into a new session"),
    ("/end", "End the current session"),
    ("/scene", "Show the live scene"),
    ("/totals", "Show unique visitors and demographics"),
    ("/at", "Show the scene at a timestamp (ms)"),
    ("/timeline", "Show counts between two timestamps (ms)"),
    ("/sessions", "List sessions"),
    ("/validate", "Validate an .occl bucket log"),
    ("/info", "Show server capabilities and tools"),
    ("/tools", "List available MCP tools"),
    ("/clear", "Clear the screen"),
    ("/help", "Show available commands"),
    ("/exit", "Quit the REPL"),
];

/// REPL helper for tab completion.
#[derive(Default)]
struct CounterHelper;

fn files_with_extension(ext: &str) -> Vec<String> {
    let mut files = Vec::new();
    if let Ok(entries) = std::fs::read_dir(".") {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().is_some_and(|e| e == ext) {
                if let Some(name) = path.file_name().and_then(|s| s.to_str()) {
                    files.push(name.to_string());
                }
            }
        }
    }
    files.sort();
    files
}

impl Completer for CounterHelper {
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

        let (cmd, args) = input.split_once(' ').unwrap_or((input, ""));
        let ext = match cmd {
            "/load" => "jsonl",
            "/validate" => "occl",
            "/start" => {
                let prefix_start = input.len() - args.len();
                let matches = ["webcam", "upload"]
                    .iter()
                    .filter(|s| s.starts_with(args.trim()))
                    .map(|s| Pair {
                        display: s.to_string(),
                        replacement: format!("{s} "),
                    })
                    .collect();
                return Ok((prefix_start, matches));
            }
            _ => return Ok((pos, Vec::new())),
        };

        let prefix_start = input.len() - args.len();
        let matches: Vec<Pair> = files_with_extension(ext)
            .into_iter()
            .filter(|f| f.starts_with(args.trim()))
            .map(|f| Pair {
                replacement: format!("{f} "),
                display: f,
            })
            .collect();
        Ok((prefix_start, matches))
    }
}

impl Hinter for CounterHelper {
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

impl Highlighter for CounterHelper {}
impl Validator for CounterHelper {}
impl Helper for CounterHelper {}

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

/// REPL state.
struct ReplState {
    registry: SessionRegistry,
    current: Option<SessionId>,
}

impl ReplState {
    fn current(&self) -> Option<SessionId> {
        if self.current.is_none() {
            eprintln!("  No session. Use /start or /load first.");
        }
        self.current
    }
}

/// Run the interactive REPL.
pub fn run(config: EngineConfig) -> anyhow::Result<()> {
    eprintln!();
    eprintln!(
        "  \x1b[32m\u{25c9}\x1b[0m \x1b[1mstore-counter-mcp v{}\x1b[0m \x1b[90m: live occupancy counting\x1b[0m",
        env!("CARGO_PKG_VERSION")
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
        .completion_prompt_limit(20)
        .build();

    let mut rl: Editor<CounterHelper, rustyline::history::DefaultHistory> =
        Editor::with_config(rl_config)?;
    rl.set_helper(Some(CounterHelper));
    rl.bind_sequence(
        KeyEvent::from('\t'),
        EventHandler::Conditional(Box::new(TabCompleteOrAcceptHint)),
    );

    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    let hist_path = std::path::PathBuf::from(&home).join(".store_counter_mcp_history");
    if hist_path.exists() {
        let _ = rl.load_history(&hist_path);
    }

    let mut state = ReplState {
        registry: SessionRegistry::new(config)?,
        current: None,
    };
    let prompt = " \x1b[36mcounter>\x1b[0m ";

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

                let (cmd, args) = input.split_once(' ').unwrap_or((input, ""));
                let args = args.trim();

                match cmd {
                    "exit" | "quit" => {
                        eprintln!("  \x1b[90m\u{2728}\x1b[0m Goodbye!");
                        break;
                    }
                    "help" | "h" | "?" => cmd_help(),
                    "clear" | "cls" => eprint!("\x1b[2J\x1b[H"),
                    "info" => cmd_info(),
                    "tools" => cmd_tools(),
                    "start" => cmd_start(args, &mut state),
                    "ingest" => cmd_ingest(args, &state),
                    "load" => cmd_load(args, &mut state),
                    "end" => cmd_end(&state),
                    "scene" => cmd_scene(&state),
                    "totals" => cmd_totals(&state),
                    "at" => cmd_at(args, &state),
                    "timeline" => cmd_timeline(args, &state),
                    "sessions" => cmd_sessions(args, &mut state),
                    "validate" => cmd_validate(args),
                    _ => {
                        eprintln!("  Unknown command '/{cmd}'. Type /help for commands.");
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                eprintln!("  \x1b[90m(Ctrl+C)\x1b[0m Type \x1b[1m/exit\x1b[0m to quit.");
            }
            Err(ReadlineError::Eof) => {
                eprintln!("  \x1b[90m\u{2728}\x1b[0m Goodbye!");
                break;
            }
            Err(err) => {
                eprintln!("  Error: {err}");
                break;
            }
        }
    }

    state.registry.end_all();
    let _ = std::fs::create_dir_all(hist_path.parent().unwrap_or(Path::new(".")));
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
    eprintln!("  Tip: /sessions <n> switches to the n-th listed session.");
    eprintln!();
}

fn cmd_info() {
    let capabilities = crate::types::InitializeResult::default_result();
    let tools = ToolRegistry::list_tools();
    eprintln!();
    eprintln!(
        "  Server:   {} v{}",
        capabilities.server_info.name, capabilities.server_info.version
    );
    eprintln!("  Protocol: {}", capabilities.protocol_version);
    eprintln!("  Tools:    {}", tools.len());
    eprintln!();
}

fn cmd_tools() {
    let tools = ToolRegistry::list_tools();
    eprintln!();
    eprintln!("  {} MCP tools available:", tools.len());
    eprintln!();
    for tool in &tools {
        eprintln!(
            "    {:<28} {}",
            tool.name,
            tool.description.as_deref().unwrap_or("")
        );
    }
    eprintln!();
}

fn cmd_start(args: &str, state: &mut ReplState) {
    let source = if args.is_empty() {
        Ok(SourceKind::Webcam)
    } else {
        args.parse::<SourceKind>()
    };
    let source = match source {
        Ok(source) => source,
        Err(e) => {
            eprintln!("  {e}");
            return;
        }
    };
    match state.registry.start_session(source) {
        Ok(session) => {
            eprintln!("  Started {source} session {}", session.id());
            state.current = Some(session.id());
        }
        Err(e) => eprintln!("  Failed to start session: {e}"),
    }
}

fn cmd_ingest(args: &str, state: &ReplState) {
    let Some(id) = state.current() else { return };
    let parts: Vec<&str> = args.split_whitespace().collect();
    if parts.len() < 3 {
        eprintln!("  Usage: /ingest <track_id> <timestamp_ms> <age_band> [gender]");
        return;
    }
    let Ok(ts) = parts[1].parse::<i64>() else {
        eprintln!("  Invalid timestamp '{}'", parts[1]);
        return;
    };
    let age: AgeBand = match parts[2].parse() {
        Ok(age) => age,
        Err(e) => {
            eprintln!("  {e}");
            return;
        }
    };
    let gender: Gender = match parts.get(3).map(|g| g.parse::<Gender>()).transpose() {
        Ok(gender) => gender.unwrap_or(Gender::Unknown),
        Err(e) => {
            eprintln!("  {e}");
            return;
        }
    };

    let event = DetectionEvent::new(parts[0], ts, age, gender);
    match state.registry.ingest(id, &event) {
        Ok(receipt) => {
            let scene = state
                .registry
                .current_scene(id)
                .map(|s| s.current_count)
                .unwrap_or_default();
            eprintln!(
                "  Accepted{} into bucket {} (present: {scene})",
                if receipt.is_new_track { " new track" } else { "" },
                receipt.bucket_index
            );
        }
        Err(e) => eprintln!("  Rejected: {e}"),
    }
}

fn cmd_load(args: &str, state: &mut ReplState) {
    if args.is_empty() {
        eprintln!("  Usage: /load <detections.jsonl>");
        return;
    }
    let path = args.split_whitespace().next().unwrap_or(args);
    match replay_file(&state.registry, Path::new(path)) {
        Ok(report) => {
            eprintln!(
                "  Replayed {path}: {} lines, {} accepted, {} rejected, {} unique visitors",
                report.lines,
                report.accepted,
                report.rejected_total(),
                report.summary.totals.total_count
            );
            state.current = Some(report.summary.session_id);
        }
        Err(e) => eprintln!("  Failed to replay: {e}"),
    }
}

fn cmd_end(state: &ReplState) {
    let Some(id) = state.current() else { return };
    match state.registry.end_session(id) {
        Ok(summary) => eprintln!(
            "  Ended {id}: {} unique visitors over {} buckets",
            summary.totals.total_count, summary.buckets_sealed
        ),
        Err(e) => eprintln!("  {e}"),
    }
}

fn print_scene(scene: &SceneState) {
    eprintln!();
    match scene.window {
        Some(w) => eprintln!(
            "  Window {} [{}ms, {}ms){}",
            w.index,
            w.start_ms,
            w.end_ms,
            if scene.sealed { " sealed" } else { " open" }
        ),
        None => eprintln!("  No data yet"),
    }
    eprintln!("    Present:  {}", scene.current_count);
    eprintln!("    Total:    {}", scene.total_count);
    eprintln!("    New:      {}", scene.total_delta);
    for share in &scene.demographics.age {
        eprintln!("    {:<9} {:>3}%", share.label.label(), share.percent);
    }
    for share in &scene.demographics.gender {
        eprintln!("    {:<9} {:>3}%", share.label.label(), share.percent);
    }
    eprintln!();
}

fn cmd_scene(state: &ReplState) {
    let Some(id) = state.current() else { return };
    match state.registry.current_scene(id) {
        Ok(scene) => print_scene(&scene),
        Err(e) => eprintln!("  {e}"),
    }
}

fn cmd_totals(state: &ReplState) {
    let Some(id) = state.current() else { return };
    match state.registry.totals(id) {
        Ok(totals) => {
            let breakdown = totals.breakdown();
            eprintln!();
            eprintln!("  Unique visitors: {}", totals.total_count);
            for band in AgeBand::ALL {
                eprintln!("    {:<9} {:>3}%", band.label(), breakdown.age_percent(band));
            }
            for gender in Gender::REPORTED {
                eprintln!("    {:<9} {:>3}%", gender.label(), breakdown.gender_percent(gender));
            }
            eprintln!("    unlabeled {}", breakdown.unlabeled);
            eprintln!();
        }
        Err(e) => eprintln!("  {e}"),
    }
}

fn cmd_at(args: &str, state: &ReplState) {
    let Some(id) = state.current() else { return };
    let Ok(ts) = args.parse::<i64>() else {
        eprintln!("  Usage: /at <timestamp_ms>");
        return;
    };
    match state.registry.state_at(id, ts) {
        Ok(scene) => print_scene(&scene),
        Err(e) => eprintln!("  {e}"),
    }
}

fn cmd_timeline(args: &str, state: &ReplState) {
    let Some(id) = state.current() else { return };
    let bounds: Vec<i64> = args
        .split_whitespace()
        .filter_map(|s| s.parse().ok())
        .collect();
    let [from, to] = bounds.as_slice() else {
        eprintln!("  Usage: /timeline <from_ms> <to_ms>");
        return;
    };
    match state.registry.timeline(id, *from, *to) {
        Ok(states) => {
            eprintln!();
            for scene in &states {
                if let Some(w) = scene.window {
                    let bar = "\u{2588}".repeat(scene.current_count.min(40) as usize);
                    eprintln!("    {:>9}ms {:>3} {bar}", w.start_ms, scene.current_count);
                }
            }
            eprintln!();
        }
        Err(e) => eprintln!("  {e}"),
    }
}

fn cmd_sessions(args: &str, state: &mut ReplState) {
    let sessions = state.registry.list();
    if let Ok(n) = args.parse::<usize>() {
        match sessions.get(n.saturating_sub(1)) {
            Some(info) => {
                state.current = Some(info.session_id);
                eprintln!("  Switched to {}", info.session_id);
            }
            None => eprintln!("  No session #{n}"),
        }
        return;
    }

    eprintln!();
    if sessions.is_empty() {
        eprintln!("  No sessions.");
    }
    for (i, info) in sessions.iter().enumerate() {
        let marker = if Some(info.session_id) == state.current { "*" } else { " " };
        eprintln!(
            "  {marker}{:>2}. {} {:<7} {:<5} total {:>4} present {:>3}",
            i + 1,
            info.session_id,
            info.source.to_string(),
            if info.live { "live" } else { "ended" },
            info.total_count,
            info.current_count
        );
    }
    eprintln!();
}

fn cmd_validate(args: &str) {
    if args.is_empty() {
        eprintln!("  Usage: /validate <file.occl>");
        return;
    }
    let path = args.split_whitespace().next().unwrap_or(args);
    match BucketLogReader::read_from_file(Path::new(path)).and_then(|log| {
        log.verify()?;
        Ok(log)
    }) {
        Ok(log) => {
            eprintln!();
            eprintln!("  Valid bucket log: {path}");
            eprintln!("    Session:   {}", log.header.session_id);
            eprintln!("    Window:    {}ms", log.header.window_ms);
            eprintln!("    Buckets:   {}", log.records.len());
            if log.truncated {
                eprintln!("    Warning:   truncated tail record ignored");
            }
            eprintln!();
        }
        Err(e) => eprintln!("  Invalid bucket log: {e}"),
    }
}
