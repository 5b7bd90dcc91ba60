use anyhow::Result;
use clap::{Args, Subcommand};
use dashprobe_session_store::SessionStatus;

use crate::cli::context::CliContext;
use crate::report::OutputFormat;

#[derive(Args, Clone, Debug)]
pub struct SessionArgs {
    #[command(subcommand)]
    pub action: SessionAction,
}

#[derive(Subcommand, Clone, Debug)]
pub enum SessionAction {
    /// Show where the session lives, its age and whether it is still usable
    Status,

    /// Delete the stored session so the next query signs in again
    Clear,
}

pub fn cmd_session(args: SessionArgs, ctx: &CliContext, output: OutputFormat) -> Result<()> {
    let store = ctx.session_store();
    match args.action {
        SessionAction::Status => {
            let status = store.status();
            match output {
                OutputFormat::Human => print!("{}", render_status(&status)),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&status)?),
                OutputFormat::Yaml => print!("{}", serde_yaml::to_string(&status)?),
            }
        }
        SessionAction::Clear => {
            if store.clear()? {
                println!("Removed session {}", store.path().display());
            } else {
                println!("No session at {}", store.path().display());
            }
        }
    }
    Ok(())
}

fn render_status(status: &SessionStatus) -> String {
    let mut lines = vec![format!("session file: {}", status.path.display())];
    if !status.exists {
        lines.push("state: absent".to_string());
    } else if !status.readable {
        lines.push("state: unreadable".to_string());
    } else {
        lines.push(format!("state: {}", if status.valid { "valid" } else { "expired" }));
        if let Some(saved_at) = status.saved_at {
            lines.push(format!("saved at: {}", saved_at.to_rfc3339()));
        }
        if let Some(age) = &status.age {
            lines.push(format!("age: {age}"));
        }
        if let Some(left) = &status.expires_in {
            lines.push(format!("expires in: {left}"));
        }
        lines.push(format!("cookies: {}", status.cookie_count));
    }
    lines.join("\n") + "\n"
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn absent_session_is_one_line_state() {
        let status = SessionStatus {
            path: PathBuf::from("session/sso_session.json"),
            exists: false,
            readable: false,
            valid: false,
            saved_at: None,
            age: None,
            expires_in: None,
            cookie_count: 0,
        };
        let text = render_status(&status);
        assert!(text.contains("state: absent"));
        assert!(!text.contains("cookies"));
    }
}
