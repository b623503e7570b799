use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use recount::reports::RecordKind;
use recount::{Config, ReportClient};

#[derive(Parser, Debug)]
#[command(name = "recount")]
#[command(about = "Review inventory count reports, online or off")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/recount/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Author name for chat and review actions (overrides config)
  #[arg(short, long)]
  operator: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// List area reports with their totals
  Areas,
  /// Show one area report
  Report {
    /// Report file name, as shown by `areas`
    file: String,
  },
  /// Show the chat log
  Chat,
  /// Post a chat message
  Say { text: String },
  /// Mark a report reviewed
  Review { file: String },
  /// Request a recount for a category of an area
  Recount { file: String, category: String },
  /// Attach a question to a report
  Ask { file: String, text: String },
  /// Browse employee, location or sku records
  Records { kind: RecordKind },
  /// Warm the caches for offline use
  Refresh,
  /// Replay queued writes now
  Flush,
  /// Show connectivity and queue status
  Status {
    /// Keep running and report offline-warning transitions
    #[arg(long)]
    watch: bool,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .with_writer(std::io::stderr)
    .init();

  let args = Args::parse();

  let config = Config::load(args.config.as_deref())?;
  let config = if args.operator.is_some() {
    Config {
      operator: args.operator,
      ..config
    }
  } else {
    config
  };

  let client = ReportClient::new(&config)?;

  match args.command {
    Command::Areas => {
      let fetched = client.area_summaries().await?;
      print_provenance(fetched.from_cache);
      for summary in &fetched.data {
        println!(
          "{} {:<20} {:>10.2} {:>8}  {}",
          if summary.reviewed { "✓" } else { " " },
          summary.area,
          summary.money_total,
          summary.quantity_total,
          summary.file,
        );
      }
    }
    Command::Report { file } => {
      let fetched = client.area_report(&file).await?;
      print_provenance(fetched.from_cache);
      let report = &fetched.data;
      println!("{} ({})", report.area, report.file);
      if let Some(counted_by) = &report.counted_by {
        println!("counted by {} at {}", counted_by, report.counted_at);
      } else {
        println!("counted at {}", report.counted_at);
      }
      println!(
        "totals: {:.2} money, {} items{}",
        report.money_total,
        report.quantity_total,
        if report.reviewed { "  [reviewed]" } else { "" },
      );
      if !report.categories.is_empty() {
        println!("categories:");
        for category in &report.categories {
          println!(
            "  {:<20} {:>10.2} {:>8}",
            category.category, category.money, category.quantity
          );
        }
      }
      for recount in &report.recounts {
        println!(
          "recount: {} (by {}, {})",
          recount.category,
          recount.requested_by,
          if recount.completed { "done" } else { "open" },
        );
      }
      for question in &report.questions {
        match &question.answer {
          Some(answer) => println!("q: {} / a: {}", question.text, answer),
          None => println!("q: {} (unanswered)", question.text),
        }
      }
    }
    Command::Chat => {
      let fetched = client.chat_log().await?;
      print_provenance(fetched.from_cache);
      for message in &fetched.data {
        println!("[{}] {}: {}", message.sent_at, message.author, message.text);
      }
      client.mark_chat_seen();
    }
    Command::Say { text } => {
      let author = operator(&config)?;
      let outcome = client.post_chat(&author, &text).await?;
      print_write_outcome(outcome.queued);
    }
    Command::Review { file } => {
      let reviewer = operator(&config)?;
      let outcome = client.mark_reviewed(&file, &reviewer).await?;
      print_write_outcome(outcome.queued);
    }
    Command::Recount { file, category } => {
      let requester = operator(&config)?;
      let outcome = client.request_recount(&file, &category, &requester).await?;
      print_write_outcome(outcome.queued);
    }
    Command::Ask { file, text } => {
      let asker = operator(&config)?;
      let outcome = client.ask_question(&file, &text, &asker).await?;
      print_write_outcome(outcome.queued);
    }
    Command::Records { kind } => {
      let fetched = client.records(kind).await?;
      print_provenance(fetched.from_cache);
      for row in &fetched.data {
        println!("{}", row);
      }
    }
    Command::Refresh => {
      client.refresh().await;
      println!(
        "caches warmed, {} write(s) still pending",
        client.pending_count()
      );
    }
    Command::Flush => {
      let outcome = client.notify_online().await;
      println!("sent {}, {} remaining", outcome.sent, outcome.remaining);
    }
    Command::Status { watch } => {
      let connectivity = client.connectivity();
      match connectivity.disconnected_since() {
        Some(since) => {
          let warning = if connectivity.is_disconnected_past_threshold() {
            ", check the connection"
          } else {
            ""
          };
          println!("offline since {} ms epoch{}", since, warning);
        }
        None => println!("online (as of the last request)"),
      }
      println!("{} queued write(s)", client.pending_count());

      if watch {
        let mut rx = client.watch_offline_warning(config.sync.poll_interval());
        loop {
          rx.changed().await?;
          if *rx.borrow() {
            println!(
              "offline for over {} seconds, check the connection",
              config.sync.offline_warn_secs
            );
          } else {
            println!("back online");
          }
        }
      }
    }
  }

  Ok(())
}

fn operator(config: &Config) -> Result<String> {
  config
    .operator
    .clone()
    .ok_or_else(|| eyre!("No operator name set. Use --operator or set `operator` in the config."))
}

fn print_provenance(from_cache: bool) {
  if from_cache {
    println!("(offline, showing cached data)");
  }
}

fn print_write_outcome(queued: bool) {
  if queued {
    println!("server unreachable, queued for replay");
  } else {
    println!("ok");
  }
}
