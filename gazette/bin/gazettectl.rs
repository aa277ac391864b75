//! Command-line utility for running a Gazette newsroom
//!
//! Talks to the same store and spool as the daemon, using the same
//! configuration file:
//! - Topic and subscriber management
//! - Publishing content for deferred delivery
//! - Inspecting content and queued delivery jobs
//! - Delivering content immediately, in-process

use std::{io::Read, path::PathBuf};

use anyhow::Context;
use chrono::{DateTime, TimeDelta, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use gazette::{Gazette, Newsroom, controller::find_config_file};
use gazette_common::models::{Content, ContentId};
use gazette_delivery::DeliveryOutcome;
use gazette_spool::SpooledJobId;
use serde::Serialize;

/// Command-line utility for running a Gazette newsroom
#[derive(Parser, Debug)]
#[command(name = "gazettectl")]
#[command(about = "Manage Gazette topics, subscribers and deliveries", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to the daemon's lookup order)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Topic management
    Topic {
        #[command(subcommand)]
        action: TopicAction,
    },
    /// Subscribe one or more addresses to a topic
    Subscribe {
        /// Topic name or id
        topic: String,
        #[arg(required = true)]
        emails: Vec<String>,
    },
    /// Remove an address from a topic
    Unsubscribe {
        /// Topic name or id
        topic: String,
        email: String,
    },
    /// List a topic's subscribers
    Subscribers {
        /// Topic name or id
        topic: String,
    },
    /// Save content and schedule its delivery
    Publish {
        /// Topic name or id
        topic: String,

        /// Content text; read from --file or stdin when omitted
        text: Option<String>,

        /// Read the content from a file
        #[arg(long, conflicts_with = "text")]
        file: Option<PathBuf>,

        /// Delivery time (RFC 3339)
        #[arg(long, value_parser = parse_time, required_unless_present = "delay_secs")]
        at: Option<DateTime<Utc>>,

        /// Deliver this many seconds from now
        #[arg(long, conflicts_with = "at")]
        delay_secs: Option<u64>,
    },
    /// Inspect content
    Content {
        #[command(subcommand)]
        action: ContentAction,
    },
    /// Deliver content now, in this process, and print the report
    Deliver { content_id: ContentId },
    /// Queue an immediate delivery for the daemon to run
    Retry { content_id: ContentId },
    /// Queued delivery jobs
    Jobs {
        #[command(subcommand)]
        action: JobsAction,
    },
}

#[derive(Subcommand, Debug)]
enum TopicAction {
    /// Create a topic
    Create {
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// List all topics
    List,
    /// Show a topic, or set its description
    Describe {
        /// Topic name or id
        topic: String,
        /// New description; omit to show the current one
        description: Option<String>,
        /// Remove the description
        #[arg(long, conflicts_with = "description")]
        clear: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ContentAction {
    /// List content, optionally for one topic
    List {
        #[arg(long)]
        topic: Option<String>,
    },
    /// Show one content item
    Show { content_id: ContentId },
}

#[derive(Subcommand, Debug)]
enum JobsAction {
    /// List queued jobs, earliest first
    List,
    /// Cancel a queued job
    Cancel { job_id: SpooledJobId },
}

fn parse_time(input: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(input)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("expected an RFC 3339 timestamp: {e}"))
}

struct Ctl {
    gazette: Gazette,
    newsroom: Newsroom,
    format: OutputFormat,
}

impl Ctl {
    fn print<T: Serialize>(&self, value: &T, text: impl FnOnce() -> String) -> anyhow::Result<()> {
        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
            OutputFormat::Text => println!("{}", text()),
        }
        Ok(())
    }

    fn claim_lease(&self) -> TimeDelta {
        i64::try_from(self.gazette.delivery().claim_lease_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(TimeDelta::MAX)
    }

    fn describe_content(&self, content: &Content) -> String {
        let state = content.state(Utc::now(), self.claim_lease());
        format!(
            "{:>6}  topic {:<6} {:<10} {}  {}",
            content.id,
            content.topic_id,
            state,
            content.scheduled_time.to_rfc3339(),
            content.content_text.lines().next().unwrap_or_default()
        )
    }

    async fn topic(&self, action: TopicAction) -> anyhow::Result<()> {
        match action {
            TopicAction::Create { name, description } => {
                let topic = self.newsroom.create_topic(&name, description).await?;
                self.print(&topic, || format!("Created topic {} ({})", topic.name, topic.id))
            }
            TopicAction::List => {
                let topics = self.newsroom.store().list_topics().await?;
                self.print(&topics, || {
                    topics
                        .iter()
                        .map(|t| {
                            format!(
                                "{:>6}  {}  {}",
                                t.id,
                                t.name,
                                t.description.as_deref().unwrap_or_default()
                            )
                        })
                        .collect::<Vec<_>>()
                        .join("\n")
                })
            }
            TopicAction::Describe {
                topic,
                description,
                clear,
            } => {
                let mut topic = self.newsroom.resolve_topic(&topic).await?;
                if description.is_some() || clear {
                    topic = self
                        .newsroom
                        .set_topic_description(topic.id, description)
                        .await?;
                }
                self.print(&topic, || {
                    format!(
                        "{} ({})\n{}",
                        topic.name,
                        topic.id,
                        topic.description.as_deref().unwrap_or("(no description)")
                    )
                })
            }
        }
    }

    async fn publish(
        &self,
        topic: &str,
        text: Option<String>,
        file: Option<PathBuf>,
        at: Option<DateTime<Utc>>,
        delay_secs: Option<u64>,
    ) -> anyhow::Result<()> {
        let topic = self.newsroom.resolve_topic(topic).await?;

        let text = match (text, file) {
            (Some(text), _) => text,
            (None, Some(path)) => tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?,
            (None, None) => {
                let mut buffer = String::new();
                std::io::stdin().read_to_string(&mut buffer)?;
                buffer
            }
        };

        let when = match (at, delay_secs) {
            (Some(at), _) => at,
            (None, Some(delay)) => i64::try_from(delay)
                .ok()
                .and_then(TimeDelta::try_seconds)
                .and_then(|delay| Utc::now().checked_add_signed(delay))
                .context("Delay is too large")?,
            (None, None) => anyhow::bail!("Either --at or --delay-secs is required"),
        };

        let publication = self.newsroom.publish(topic.id, &text, when).await?;
        let content = &publication.content;

        match &publication.schedule {
            Ok(job) => self.print(content, || {
                format!(
                    "Content {} for {} scheduled at {} (job {job})",
                    content.id,
                    topic.name,
                    when.to_rfc3339()
                )
            }),
            Err(e) => {
                eprintln!(
                    "warning: content {} saved but not scheduled: {e}\n\
                     warning: run `gazettectl retry {}` once the spool is available",
                    content.id, content.id
                );
                self.print(content, || format!("Content {} saved", content.id))
            }
        }
    }

    async fn deliver(&self, content_id: ContentId) -> anyhow::Result<()> {
        let executor = self.gazette.executor(self.newsroom.store().clone())?;

        match executor.trigger_delivery(content_id).await? {
            DeliveryOutcome::Delivered(report) => self.print(&report, || report.to_string()),
            DeliveryOutcome::AlreadyDelivered => {
                println!("Content {content_id} was already delivered");
                Ok(())
            }
            DeliveryOutcome::InProgress => {
                println!("Content {content_id} is being delivered by another process");
                Ok(())
            }
        }
    }

    async fn run(&self, command: Commands) -> anyhow::Result<()> {
        match command {
            Commands::Topic { action } => self.topic(action).await,
            Commands::Subscribe { topic, emails } => {
                let topic = self.newsroom.resolve_topic(&topic).await?;
                let created = self.newsroom.subscribe(topic.id, &emails).await?;
                self.print(&created, || {
                    format!(
                        "Subscribed {} new address(es) to {} ({} already subscribed)",
                        created.len(),
                        topic.name,
                        emails.len().saturating_sub(created.len())
                    )
                })
            }
            Commands::Unsubscribe { topic, email } => {
                let topic = self.newsroom.resolve_topic(&topic).await?;
                if self.newsroom.unsubscribe(topic.id, &email).await? {
                    println!("Unsubscribed {email} from {}", topic.name);
                } else {
                    println!("{email} is not subscribed to {}", topic.name);
                }
                Ok(())
            }
            Commands::Subscribers { topic } => {
                let topic = self.newsroom.resolve_topic(&topic).await?;
                let subscribers = self.newsroom.store().list_subscribers(topic.id).await?;
                self.print(&subscribers, || {
                    subscribers
                        .iter()
                        .map(|s| format!("{}  {}", s.email, s.created_at.to_rfc3339()))
                        .collect::<Vec<_>>()
                        .join("\n")
                })
            }
            Commands::Publish {
                topic,
                text,
                file,
                at,
                delay_secs,
            } => self.publish(&topic, text, file, at, delay_secs).await,
            Commands::Content { action } => match action {
                ContentAction::List { topic } => {
                    let topic_id = match topic {
                        Some(topic) => Some(self.newsroom.resolve_topic(&topic).await?.id),
                        None => None,
                    };
                    let contents = self.newsroom.store().list_content(topic_id).await?;
                    self.print(&contents, || {
                        contents
                            .iter()
                            .map(|c| self.describe_content(c))
                            .collect::<Vec<_>>()
                            .join("\n")
                    })
                }
                ContentAction::Show { content_id } => {
                    let content = self
                        .newsroom
                        .store()
                        .get_content(content_id)
                        .await?
                        .with_context(|| format!("Content not found: {content_id}"))?;
                    self.print(&content, || {
                        format!(
                            "{}\n\n{}",
                            self.describe_content(&content),
                            content.content_text
                        )
                    })
                }
            },
            Commands::Deliver { content_id } => self.deliver(content_id).await,
            Commands::Retry { content_id } => {
                let job = self.newsroom.retrigger(content_id).await?;
                println!("Queued job {job} for content {content_id}");
                Ok(())
            }
            Commands::Jobs { action } => match action {
                JobsAction::List => {
                    let jobs = self.newsroom.scheduler().pending_jobs().await?;
                    self.print(&jobs, || {
                        jobs.iter()
                            .map(|job| {
                                format!(
                                    "{}  content {:<6} {}  attempts {}{}",
                                    job.id,
                                    job.content_id,
                                    job.not_before.to_rfc3339(),
                                    job.attempts,
                                    job.last_error
                                        .as_deref()
                                        .map(|e| format!("  last error: {e}"))
                                        .unwrap_or_default()
                                )
                            })
                            .collect::<Vec<_>>()
                            .join("\n")
                    })
                }
                JobsAction::Cancel { job_id } => {
                    if self.newsroom.scheduler().cancel(&job_id).await? {
                        println!("Cancelled job {job_id}");
                    } else {
                        println!("Job {job_id} is not queued (unknown, or already running)");
                    }
                    Ok(())
                }
            },
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(path) => path,
        None => find_config_file()?,
    };
    let gazette = Gazette::load(&config_path)?;
    let newsroom = gazette.newsroom().await?;

    let ctl = Ctl {
        gazette,
        newsroom,
        format: cli.format,
    };

    ctl.run(cli.command).await
}
