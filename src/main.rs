//! mediakeys — command-line host for the media-key core.
//!
//! Usage: mediakeys <login|redirect URL|toggle|next|previous|status|logout|run>

use anyhow::{bail, Result};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use mediakeys::shell::BrowserShell;
use mediakeys::{App, Config, HostEvent, SessionState};

const USAGE: &str = "\
Usage: mediakeys <command>

Commands:
  login            Open the Spotify login page
  redirect <url>   Complete a login with the redirect URL
  toggle           Play or pause
  next             Skip to the next track
  previous         Skip to the previous track
  status           Print whether something is playing
  logout           Forget the stored credential
  run              Read events from stdin (playpause, next, previous,
                   redirect <url>, login, refresh, logout, state, quit)";

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match run(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &[String]) -> Result<()> {
    let Some(command) = args.first() else {
        eprintln!("{}", USAGE);
        bail!("missing command");
    };

    if matches!(command.as_str(), "help" | "--help" | "-h") {
        println!("{}", USAGE);
        return Ok(());
    }

    let config = Config::load()?;
    let app = App::new(&config, Arc::new(BrowserShell))?;

    match command.as_str() {
        "login" => {
            if app.startup().await == SessionState::Authenticated {
                println!("Already connected");
                return Ok(());
            }
            app.session().initiate_login().await?;
            println!("Finish logging in in your browser");
        }
        "redirect" => {
            let Some(url) = args.get(1) else {
                bail!("redirect needs a URL");
            };
            let state = app.on_redirect(url).await?;
            println!("Session {}", state);
        }
        "logout" => {
            app.session().logout().await?;
            println!("Logged out");
        }
        "run" => run_event_loop(&app).await?,
        other => {
            let event: HostEvent = match other {
                "status" => return print_status(&app).await,
                _ => other.parse()?,
            };
            require_session(&app).await?;
            let outcome = app.dispatch(event).await?;
            println!("{}", capitalize(&outcome.to_string()));
        }
    }
    Ok(())
}

async fn require_session(app: &App) -> Result<()> {
    match app.startup().await {
        SessionState::Authenticated => Ok(()),
        state => bail!("not connected ({}); run `mediakeys login` first", state),
    }
}

async fn print_status(app: &App) -> Result<()> {
    require_session(app).await?;
    let playing = app.playback().currently_playing().await?;
    println!("{}", if playing { "Playing" } else { "Not playing" });
    Ok(())
}

/// Line-oriented host: each stdin line is one menu click or key press.
async fn run_event_loop(app: &App) -> Result<()> {
    let state = app.startup().await;
    println!("Session {}", state);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let result = match line {
            "quit" | "exit" => break,
            "state" => Ok(format!("session {}", app.session().state().await)),
            "login" => app
                .session()
                .initiate_login()
                .await
                .map(|_| "login page opened".to_string())
                .map_err(anyhow::Error::from),
            "refresh" => app
                .session()
                .refresh()
                .await
                .map(|_| "session refreshed".to_string())
                .map_err(anyhow::Error::from),
            "logout" => app
                .session()
                .logout()
                .await
                .map(|_| "logged out".to_string())
                .map_err(anyhow::Error::from),
            other => match other.parse::<HostEvent>() {
                Ok(event) => app.dispatch(event).await.map(|o| o.to_string()),
                Err(e) => Err(e),
            },
        };

        match result {
            Ok(message) => println!("ok: {}", message),
            Err(e) => println!("error: {:#}", e),
        }
    }
    Ok(())
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
