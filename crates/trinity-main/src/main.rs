use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use trinity_memory::AgentSource;

mod config_cmd;
mod doctor;
mod duration;
mod logging;
mod memory_cmd;
mod observe_cmd;
mod settings;
mod trinity_home;

use duration::parse_duration;
use memory_cmd::ListOptions;
use settings::Settings;

#[derive(Parser, Debug)]
#[command(name = "trinity", version, about = "shared memory for the trinity agents")]
struct Cli {
    #[arg(long, global = true)]
    conf_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: RootCommand,
}

#[derive(Subcommand, Debug, Clone)]
enum RootCommand {
    /// Sample system health and record observer insights.
    Observe(ObserveArgs),
    /// Append one entry to the shared memory.
    Note(NoteArgs),
    /// Run the lesson recorder on one conversational turn.
    Lesson(LessonArgs),
    /// Print stored entries.
    List(ListArgs),
    /// Evict old entries.
    Prune(PruneArgs),
    /// Print the digest the conversational agent adds to its prompt.
    Context(ContextArgs),
    Config(ConfigArgs),
    Doctor,
}

#[derive(Args, Debug, Clone)]
struct ObserveArgs {
    /// Run a single cycle and exit.
    #[arg(long, default_value_t = false)]
    once: bool,
}

#[derive(Args, Debug, Clone)]
struct NoteArgs {
    #[arg(long)]
    source: AgentSource,
    #[arg(long)]
    category: String,
    #[arg(required = true, num_args = 1..)]
    text: Vec<String>,
}

#[derive(Args, Debug, Clone)]
struct LessonArgs {
    #[arg(long)]
    user: String,
    #[arg(long)]
    assistant: Option<String>,
}

#[derive(Args, Debug, Clone)]
struct ListArgs {
    #[arg(long)]
    source: Option<AgentSource>,
    #[arg(long)]
    category: Option<String>,
    /// Only entries newer than this, e.g. 30m or 2d.
    #[arg(long, value_parser = parse_duration)]
    since: Option<Duration>,
    /// Show only the last n matching entries.
    #[arg(long)]
    limit: Option<usize>,
    /// One JSON object per line.
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[derive(Args, Debug, Clone)]
struct PruneArgs {
    #[arg(long)]
    max_entries: Option<usize>,
    #[arg(long, value_parser = parse_duration)]
    max_age: Option<Duration>,
}

#[derive(Args, Debug, Clone)]
struct ContextArgs {
    /// Ignore observer insights older than this.
    #[arg(long, value_parser = parse_duration)]
    window: Option<Duration>,
    #[arg(long)]
    lessons: Option<usize>,
}

#[derive(Args, Debug, Clone)]
struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigSubcommand,
}

#[derive(Subcommand, Debug, Clone)]
enum ConfigSubcommand {
    /// Create the conf dir tree and trinity.toml.
    Init,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let conf_dir = cli.conf_dir.clone();
    let result = match cli.command {
        RootCommand::Observe(args) => match load_runtime(conf_dir) {
            Ok(settings) => observe_cmd::run_observe(&settings, args.once).await,
            Err(error) => Err(error),
        },
        RootCommand::Note(args) => load_runtime(conf_dir).and_then(|settings| {
            memory_cmd::run_note(&settings, args.source, &args.category, &args.text.join(" "))
        }),
        RootCommand::Lesson(args) => load_runtime(conf_dir)
            .and_then(|settings| memory_cmd::run_lesson(&settings, args.user, args.assistant)),
        RootCommand::List(args) => load_runtime(conf_dir).and_then(|settings| {
            memory_cmd::run_list(
                &settings,
                &ListOptions {
                    source: args.source,
                    category: args.category,
                    since: args.since,
                    limit: args.limit,
                    json: args.json,
                },
            )
        }),
        RootCommand::Prune(args) => load_runtime(conf_dir).and_then(|settings| {
            memory_cmd::run_prune(&settings, args.max_entries, args.max_age)
        }),
        RootCommand::Context(args) => load_runtime(conf_dir)
            .and_then(|settings| memory_cmd::run_context(&settings, args.window, args.lessons)),
        RootCommand::Config(args) => match args.command {
            ConfigSubcommand::Init => config_cmd::run_config_init(conf_dir),
        },
        RootCommand::Doctor => doctor::run_doctor(conf_dir),
    };

    if let Err(error) = result {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

/// Resolve the conf dir, load `trinity.toml` and start file logging.
fn load_runtime(conf_dir: Option<PathBuf>) -> Result<Settings, String> {
    let conf_dir = trinity_home::resolve_trinity_home_dir(conf_dir.as_deref());
    let settings = settings::load_settings(&conf_dir)?;
    logging::init_tracing(&settings.log);
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_accepts_observe_once() {
        let parsed = Cli::try_parse_from(["trinity", "observe", "--once"]).expect("parse");
        assert!(matches!(
            parsed.command,
            RootCommand::Observe(ObserveArgs { once: true })
        ));
    }

    #[test]
    fn cli_accepts_conf_dir_global_flag() {
        let parsed = Cli::try_parse_from(["trinity", "list", "--conf-dir", "/tmp/trinity-conf"])
            .expect("parse");
        assert_eq!(parsed.conf_dir, Some(PathBuf::from("/tmp/trinity-conf")));
    }

    #[test]
    fn cli_parses_note_source_and_text_words() {
        let parsed = Cli::try_parse_from([
            "trinity",
            "note",
            "--source",
            "Observer",
            "--category",
            "load",
            "cpu",
            "92%",
        ])
        .expect("parse");
        let RootCommand::Note(args) = parsed.command else {
            panic!("expected note command");
        };
        assert_eq!(args.source, AgentSource::Observer);
        assert_eq!(args.text.join(" "), "cpu 92%");
    }

    #[test]
    fn cli_rejects_unknown_source() {
        let parsed = Cli::try_parse_from([
            "trinity", "note", "--source", "robot", "--category", "load", "x",
        ]);
        assert!(parsed.is_err(), "unknown source should be rejected");
    }

    #[test]
    fn cli_parses_list_filters() {
        let parsed = Cli::try_parse_from([
            "trinity", "list", "--since", "2h", "--limit", "5", "--json",
        ])
        .expect("parse");
        let RootCommand::List(args) = parsed.command else {
            panic!("expected list command");
        };
        assert_eq!(args.since, Some(Duration::from_secs(7_200)));
        assert_eq!(args.limit, Some(5));
        assert!(args.json);
    }

    #[test]
    fn cli_rejects_malformed_duration() {
        let parsed = Cli::try_parse_from(["trinity", "prune", "--max-age", "soon"]);
        assert!(parsed.is_err(), "malformed duration should be rejected");
    }

    #[test]
    fn cli_accepts_config_init_and_doctor() {
        assert!(Cli::try_parse_from(["trinity", "config", "init"]).is_ok());
        assert!(Cli::try_parse_from(["trinity", "doctor"]).is_ok());
    }
}
