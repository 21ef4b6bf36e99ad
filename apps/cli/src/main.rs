use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    filter::{DEFAULT_PRICE_MAX, DEFAULT_PRICE_MIN},
    load_settings, ApiContext, CatalogBrowser, ClientError, DurationBucket, FilterCriteria,
    IntervalTicks, LmsClient, PriceRange, QuizEvent, QuizRunner, QuizSession, SessionStatus,
    SortKey,
};
use shared::{domain::QuizId, protocol::QuizResult};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "lms", about = "Browse the course catalog and take quizzes")]
struct Args {
    /// Overrides the configured API base URL.
    #[arg(long)]
    api_url: Option<String>,
    /// Overrides the configured bearer token.
    #[arg(long)]
    token: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List courses matching the given filters.
    Courses(CourseFilterArgs),
    /// Show the categories, levels and instructors available for filtering.
    Options,
    /// Take a quiz interactively.
    Quiz { quiz_id: String },
}

#[derive(clap::Args, Debug)]
struct CourseFilterArgs {
    #[arg(long, default_value = "")]
    search: String,
    #[arg(long)]
    category: Option<String>,
    #[arg(long)]
    level: Option<String>,
    #[arg(long, default_value_t = DEFAULT_PRICE_MIN)]
    min_price: u64,
    #[arg(long, default_value_t = DEFAULT_PRICE_MAX)]
    max_price: u64,
    /// One of 0-2, 2-5, 5-10, 10+ (hours).
    #[arg(long)]
    duration: Option<DurationBucket>,
    /// relevance, title, price, price-desc or duration.
    #[arg(long, default_value = "relevance")]
    sort: SortKey,
}

impl CourseFilterArgs {
    fn criteria(self) -> (FilterCriteria, SortKey) {
        let criteria = FilterCriteria {
            search_term: self.search,
            category: self.category,
            level: self.level,
            price: PriceRange {
                min: self.min_price,
                max: self.max_price,
            },
            duration: self.duration,
        };
        (criteria, self.sort)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();

    let mut settings = load_settings();
    if let Some(url) = args.api_url {
        settings.api_base_url = url;
    }
    if let Some(token) = args.token {
        settings.auth_token = Some(token);
    }
    tracing::debug!(
        "cli: api_base_url={} authenticated={}",
        settings.api_base_url,
        settings.auth_token.is_some()
    );
    let ctx = ApiContext::from_settings(&settings).context("invalid client settings")?;
    let client = Arc::new(LmsClient::new(ctx).context("failed to build http client")?);

    match args.command {
        Command::Courses(filters) => list_courses(&client, filters).await,
        Command::Options => list_options(&client).await,
        Command::Quiz { quiz_id } => {
            take_quiz(client, QuizId::new(quiz_id), settings.tick_interval()).await
        }
    }
}

async fn list_courses(client: &LmsClient, filters: CourseFilterArgs) -> Result<()> {
    let mut browser = CatalogBrowser::new(client.fetch_catalog().await.context("fetch catalog")?);
    (browser.criteria, browser.sort) = filters.criteria();

    let visible = browser.visible();
    println!(
        "{} of {} courses ({} filters active)",
        visible.len(),
        browser.items().len(),
        browser.criteria.active_filter_count()
    );
    for item in visible {
        let duration = item
            .duration
            .map(|hours| format!("{hours}h"))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  [{}] {} | {} | {} | {} | {}",
            item.id,
            item.title,
            item.category,
            item.level,
            format_price(item.price),
            duration
        );
    }
    Ok(())
}

async fn list_options(client: &LmsClient) -> Result<()> {
    let browser = CatalogBrowser::new(client.fetch_catalog().await.context("fetch catalog")?);
    let options = browser.options();
    println!("categories:  {}", options.categories.join(", "));
    println!("levels:      {}", options.levels.join(", "));
    println!("instructors: {}", options.instructors.join(", "));
    let buckets: Vec<&str> = DurationBucket::ALL.iter().map(|b| b.label()).collect();
    println!("durations:   {}", buckets.join(", "));
    Ok(())
}

async fn take_quiz(
    client: Arc<LmsClient>,
    quiz_id: QuizId,
    tick_interval: std::time::Duration,
) -> Result<()> {
    let quiz = client
        .fetch_quiz(&quiz_id)
        .await
        .with_context(|| format!("fetch quiz {quiz_id}"))?;
    println!("{}", quiz.title);
    if !quiz.description.is_empty() {
        println!("{}", quiz.description);
    }
    println!("commands: n(ext) p(rev) g <number> a <answer> c(lear) s(ubmit) q(uit)");

    let runner = QuizRunner::start(
        QuizSession::new(quiz),
        client,
        Arc::new(IntervalTicks::new(tick_interval)),
    );
    let mut events = runner.subscribe_events();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    render_question(&runner).await;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(QuizEvent::Tick { remaining_seconds }) if remaining_seconds % 60 == 0 || remaining_seconds <= 10 => {
                    println!("  time left: {:02}:{:02}", remaining_seconds / 60, remaining_seconds % 60);
                }
                Ok(QuizEvent::Submitting { .. }) => println!("submitting..."),
                Ok(QuizEvent::Completed(result)) => {
                    print_result(&result);
                    return Ok(());
                }
                Ok(QuizEvent::SubmitFailed { status, message }) => {
                    println!("submission failed: {message}");
                    if status == SessionStatus::AwaitingRetry {
                        println!("time is up; type 's' to retry the submission");
                    }
                }
                Ok(_) | Err(_) => {}
            },
            line = lines.next_line() => {
                let Some(line) = line.context("read stdin")? else {
                    runner.cancel();
                    return Ok(());
                };
                if !handle_command(&runner, line.trim()).await {
                    runner.cancel();
                    println!("quiz abandoned");
                    return Ok(());
                }
            }
        }
    }
}

/// Returns false when the user quits.
async fn handle_command(runner: &QuizRunner, line: &str) -> bool {
    let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
    let outcome: Result<(), ClientError> = match command {
        "n" => runner.go_to_next().await.map(|_| ()),
        "p" => runner.go_to_previous().await.map(|_| ()),
        "g" => match rest.trim().parse::<usize>() {
            Ok(number) if number > 0 => runner.go_to(number - 1).await.map(|_| ()),
            _ => {
                println!("usage: g <question number>");
                Ok(())
            }
        },
        "a" => runner.record_current_answer(rest.trim()).await,
        "c" => runner.clear_current_answer().await,
        "s" => match runner.submit().await {
            // Completion is printed from the event stream.
            Ok(_) => return true,
            Err(err) => Err(err),
        },
        "q" => return false,
        "" => Ok(()),
        other => {
            println!("unknown command '{other}'");
            Ok(())
        }
    };

    match outcome {
        Ok(()) => render_question(runner).await,
        Err(ClientError::Status { .. } | ClientError::Transport(_)) => {}
        Err(err) => println!("{err}"),
    }
    true
}

async fn render_question(runner: &QuizRunner) {
    let view = runner.view().await;
    let rendered = runner
        .with_session(|session| {
            let question = session.current_question()?;
            let mut out = format!(
                "\nQuestion {}/{} ({}) {}",
                view.current_index + 1,
                view.question_count,
                question.kind.label(),
                question.text
            );
            for (i, option) in question.options.iter().enumerate() {
                out.push_str(&format!("\n  {}. {option}", i + 1));
            }
            if let Some(answer) = session.answer(&question.id) {
                out.push_str(&format!("\n  your answer: {answer}"));
            }
            Some(out)
        })
        .await;

    match rendered {
        Some(text) => println!("{text}"),
        None => println!("this quiz has no questions"),
    }
    let remaining = view
        .remaining
        .map(|r| format!(" | time left {r}"))
        .unwrap_or_default();
    println!(
        "answered {}/{}{remaining}",
        view.answered, view.question_count
    );
}

fn print_result(result: &QuizResult) {
    println!(
        "score {}/{} ({:.0}%) - {}",
        result.score,
        result.total,
        result.percentage(),
        if result.passed { "passed" } else { "not passed" }
    );
    for (i, question) in result.results.iter().enumerate() {
        let mark = if question.correct { "correct" } else { "wrong" };
        println!(
            "  {}. {mark}: yours={} expected={}",
            i + 1,
            question.user_answer.as_deref().unwrap_or("-"),
            question.correct_answer.as_deref().unwrap_or("-")
        );
    }
}

fn format_price(minor_units: u64) -> String {
    if minor_units == 0 {
        return "free".to_string();
    }
    format!("{}.{:02}", minor_units / 100, minor_units % 100)
}
