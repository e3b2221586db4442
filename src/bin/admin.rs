//! SyncFamily Admin CLI
//!
//! Inspection and maintenance of the bot's database.
//!
//! # Usage
//!
//! ```bash
//! syncfamily-admin families
//! syncfamily-admin members 3
//! syncfamily-admin rotate-code 3
//! ```

use clap::{Parser, Subcommand};
use sqlx::SqliteConnection;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use syncfamily::db::{family_repo, init_db};
use syncfamily::models::FamilyId;
use syncfamily::Config;

#[derive(Parser)]
#[command(name = "syncfamily-admin")]
#[command(version)]
#[command(about = "SyncFamily administration tool")]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List families with member and product counts
    Families,
    /// Show the members of a family
    Members {
        /// Family ID
        family_id: FamilyId,
    },
    /// Issue a new invite code; the old one stops working
    RotateCode {
        /// Family ID
        family_id: FamilyId,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "syncfamily=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = Config::load(cli.config)?;

    let pool = init_db(&config.database_path).await?;
    let mut conn = pool.acquire().await?;

    match cli.command {
        Commands::Families => list_families(&mut conn).await?,
        Commands::Members { family_id } => list_members(&mut conn, family_id).await?,
        Commands::RotateCode { family_id } => {
            rotate_code(&mut conn, family_id, &config.bot_username).await?
        }
    }

    drop(conn);
    pool.close().await;
    Ok(())
}

async fn list_families(conn: &mut SqliteConnection) -> Result<(), Box<dyn std::error::Error>> {
    let families = family_repo::list_families(conn).await?;
    if families.is_empty() {
        println!("No families found.");
        return Ok(());
    }

    println!("{:<6} {:<14} {:>8} {:>8}", "ID", "INVITE", "MEMBERS", "ITEMS");
    for family in families {
        println!(
            "{:<6} {:<14} {:>8} {:>8}",
            family.id, family.invite_code, family.member_count, family.product_count
        );
    }
    Ok(())
}

async fn list_members(
    conn: &mut SqliteConnection,
    family_id: FamilyId,
) -> Result<(), Box<dyn std::error::Error>> {
    if family_repo::get_family(conn, family_id).await?.is_none() {
        return Err(format!("Family {} not found", family_id).into());
    }

    let members = family_repo::get_members_of(conn, family_id).await?;
    if members.is_empty() {
        println!("Family {} has no members.", family_id);
        return Ok(());
    }

    println!("{:<14} {:<24} {:<8} {}", "CHAT", "NAME", "MODE", "MESSAGE");
    for member in members {
        let message = member
            .last_message_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<14} {:<24} {:<8} {}",
            member.chat_id,
            member.username,
            member.mode.to_string(),
            message
        );
    }
    Ok(())
}

async fn rotate_code(
    conn: &mut SqliteConnection,
    family_id: FamilyId,
    bot_username: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    match family_repo::rotate_invite_code(conn, family_id).await? {
        Some(code) => {
            println!("New invite code: {}", code);
            println!("  Link: {}", syncfamily::ui::invite_link(bot_username, &code));
            Ok(())
        }
        None => Err(format!("Family {} not found", family_id).into()),
    }
}
