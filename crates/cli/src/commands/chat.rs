use std::io::{self, BufRead, Write};

use tracing::warn;
use vendedor_agent::AgentRuntime;
use vendedor_core::config::LoadOptions;

use crate::commands::{load_config, CommandResult, EXIT_RUNTIME};
use crate::logging::init_logging;

const HELP: &str =
    "Comandos: /reset reinicia la conversación, /contexto muestra lo que sé, /salir termina.";

pub fn run(options: LoadOptions, session: Option<String>) -> CommandResult {
    let config = match load_config("chat", options) {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    init_logging(&config);

    let agent = match AgentRuntime::from_config(&config) {
        Ok(agent) => agent,
        Err(error) => {
            return CommandResult::failure("chat", "runtime_init", error.to_string(), EXIT_RUNTIME);
        }
    };
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "chat",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                EXIT_RUNTIME,
            );
        }
    };

    let session_id = session.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let stdin = io::stdin();
    let stdout = io::stdout();
    match runtime.block_on(converse(&agent, &session_id, stdin.lock(), stdout.lock())) {
        Ok(_) => CommandResult { exit_code: 0, output: String::new() },
        Err(error) => CommandResult::failure("chat", "io", error.to_string(), 1),
    }
}

/// Reads customer lines from `input` until EOF or `/salir`, writing replies to
/// `output`. Returns the number of turns sent to the assistant.
pub async fn converse<R: BufRead, W: Write>(
    agent: &AgentRuntime,
    session_id: &str,
    mut input: R,
    mut output: W,
) -> io::Result<usize> {
    writeln!(output, "Asistente de {} (sesión {session_id}).", agent.settings().store_name)?;
    if let Err(error) = agent.catalog_status() {
        warn!(event_name = "cli.chat.catalog_unavailable", error = %error, "catalog did not load");
        writeln!(output, "{}", error.user_message())?;
    }
    writeln!(output, "{HELP}")?;

    let mut turns = 0;
    let mut line = String::new();
    loop {
        write!(output, "tú> ")?;
        output.flush()?;

        line.clear();
        if input.read_line(&mut line)? == 0 {
            writeln!(output)?;
            break;
        }
        let message = line.trim();

        match message {
            "" => continue,
            "/salir" | "/exit" | "/quit" => break,
            "/ayuda" | "/help" => writeln!(output, "{HELP}")?,
            "/reset" => {
                agent.reset_session(session_id).await;
                writeln!(output, "vendedor> Listo, empecemos de nuevo. ¿Qué producto buscas?")?;
            }
            "/contexto" => {
                let snapshot = agent.context_snapshot(session_id).await.unwrap_or_default();
                let rendered = serde_json::json!({
                    "user_name": snapshot.user_name(),
                    "slots": snapshot.slots(),
                    "turns": snapshot.history().len(),
                });
                writeln!(output, "{}", serde_json::to_string_pretty(&rendered)?)?;
            }
            _ => {
                let outcome = agent.process_turn(session_id, message).await;
                turns += 1;
                writeln!(output, "vendedor> {}", outcome.reply)?;
            }
        }
    }

    agent.end_session(session_id).await;
    Ok(turns)
}
