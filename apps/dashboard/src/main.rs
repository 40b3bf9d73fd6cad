use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use client_core::{load_settings, Dashboard, DashboardSnapshot};
use serde_json::{json, Value};
use shared::domain::{GroupId, QuestionId};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Cli {
    /// Overrides the server url from dashboard.toml and the environment.
    #[arg(long)]
    server_url: Option<String>,
    #[arg(long)]
    username: String,
    /// Print the resulting view as JSON.
    #[arg(long)]
    json: bool,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    Show,
    Ask {
        group_id: String,
        text: String,
    },
    Answer {
        question_id: String,
        text: String,
    },
    CreateGroup {
        name: String,
    },
    AddUser {
        group_id: String,
        username: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();
    let cli = Cli::parse();

    let mut settings = load_settings();
    if let Some(server_url) = cli.server_url {
        settings.server_url = server_url;
    }
    info!(server_url = %settings.server_url, "dashboard: starting");

    let dashboard = Dashboard::from_settings(&settings)?;
    dashboard.load(&cli.username).await?;

    match cli.command.unwrap_or(Command::Show) {
        Command::Show => {}
        Command::Ask { group_id, text } => {
            if !dashboard.submit_question(&GroupId::new(group_id), &text).await? {
                bail!("question text is empty");
            }
        }
        Command::Answer { question_id, text } => {
            match dashboard
                .submit_answer(&QuestionId::new(question_id), &text)
                .await?
            {
                Some(answer) => match answer.accuracy {
                    Some(accuracy) => println!("answer recorded, accuracy {accuracy:.2}"),
                    None => println!("answer recorded"),
                },
                None => bail!("answer text is empty"),
            }
        }
        Command::CreateGroup { name } => match dashboard.create_group(&name).await? {
            Some(group) => println!("created group {} ({})", group.name, group.group_id),
            None => bail!("group name is empty"),
        },
        Command::AddUser { group_id, username } => {
            if !dashboard
                .add_user_to_group(&GroupId::new(group_id.clone()), &username)
                .await?
            {
                bail!("username is empty");
            }
            println!("added {} to group {group_id}", username.trim());
        }
    }

    let snapshot = dashboard.snapshot().await;
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&snapshot_json(&snapshot))?);
    } else {
        print_snapshot(&snapshot);
    }

    Ok(())
}

fn snapshot_json(snapshot: &DashboardSnapshot) -> Value {
    let groups = snapshot
        .user
        .iter()
        .flat_map(|user| user.groups.iter())
        .map(|group| {
            let questions = snapshot
                .questions(&group.group_id)
                .iter()
                .map(|question| {
                    json!({
                        "question": question,
                        "answers": snapshot.answers(&question.question_id),
                    })
                })
                .collect::<Vec<_>>();
            json!({
                "name": group.name,
                "groupId": group.group_id,
                "questions": questions,
            })
        })
        .collect::<Vec<_>>();

    json!({
        "user": snapshot.user,
        "groups": groups,
        "failures": snapshot.failed_groups,
    })
}

fn print_snapshot(snapshot: &DashboardSnapshot) {
    let Some(user) = &snapshot.user else {
        println!("no user loaded");
        return;
    };
    println!("{} ({})", user.display_name(), user.username);

    for group in &user.groups {
        println!();
        println!("# {} [{}]", group.name, group.group_id);
        let questions = snapshot.questions(&group.group_id);
        if questions.is_empty() {
            println!("  (no questions)");
        }
        for question in questions {
            println!(
                "  Q {} [{}] from {}",
                question.text, question.question_id, question.username
            );
            for answer in snapshot.answers(&question.question_id) {
                match answer.accuracy {
                    Some(accuracy) => println!(
                        "    A {} from {} (accuracy {accuracy:.2})",
                        answer.text, answer.username
                    ),
                    None => println!("    A {} from {}", answer.text, answer.username),
                }
            }
        }
    }

    for failure in &snapshot.failed_groups {
        match &failure.group_id {
            Some(group_id) => eprintln!(
                "warning: group {group_id} incomplete ({:?}): {}",
                failure.stage, failure.reason
            ),
            None => eprintln!("warning: skipped group entry: {}", failure.reason),
        }
    }
}
