//! TODOK CLI - Debate practice in the terminal
//!
//! Pick a character, a topic and a stance, argue with the model, then get a
//! rubric score for your side of the debate.

use std::env;
use std::io::Write;
use std::path::PathBuf;

use clap::Parser;
use colored::Colorize;
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use todok_core::{
    Config, DebateBot, DebateError, EvaluationResult, Stance, default_config,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

type Input = Lines<BufReader<Stdin>>;
type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

const END_COMMANDS: [&str; 2] = ["종료", "/end"];

#[derive(Parser)]
#[command(
    name = "todok",
    version,
    about = "Debate practice against an AI opponent",
    long_about = "Argue one side of a debate topic against an AI character, then receive a rubric-based evaluation."
)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override the model name from the configuration
    #[arg(short, long, value_name = "MODEL")]
    model: Option<String>,

    /// Show debug logs and full error details
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() {
    // Load environment variables from .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let default_level = if cli.debug { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let debug = cli.debug;
    if let Err(e) = run(cli).await {
        error!("Fatal error: {}", e);
        eprintln!("{} {}", "Error:".red().bold(), e);
        if debug {
            eprintln!("{:?}", e);
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => default_config(),
    };
    if let Some(model) = cli.model {
        config.model.name = model;
    }
    if let Ok(api_base) = env::var("OPENAI_API_BASE") {
        config.model.api_base = api_base;
    }

    let mut bot = DebateBot::from_config(config)?;
    bot.load_content()?;
    info!("DebateBot initialized");

    let mut input = BufReader::new(tokio::io::stdin()).lines();

    print_banner();

    loop {
        let Some((persona, topic, stance)) = select_debate(&bot, &mut input).await? else {
            break;
        };

        match bot.start_debate(&persona, &topic, stance) {
            Ok(session) => {
                println!();
                println!(
                    "{}",
                    format!(
                        "당신은 \"{}\"에 {}하셨습니다. 즐겁게 토론 해보세요.",
                        session.topic().topic,
                        session.user_stance()
                    )
                    .dimmed()
                );
                println!(
                    "{}",
                    format!(
                        "토론을 끝내고 점수를 확인하려면 '{}'를 입력하세요.",
                        END_COMMANDS[0]
                    )
                    .dimmed()
                );
            }
            Err(e) => {
                report_error(&e, cli.debug);
                continue;
            }
        }

        if !debate_loop(&mut bot, &mut input, cli.debug).await? {
            break;
        }

        match bot.evaluate_debate().await {
            Ok(result) => print_evaluation(result),
            Err(e) => report_error(&e, cli.debug),
        }

        let again = prompt(&mut input, "다시 토론하시겠습니까? (y/n): ").await?;
        if !matches!(again.as_deref().map(str::trim), Some("y" | "Y" | "예")) {
            break;
        }
    }

    println!();
    println!("{}", "오늘 토론 재밌었어요! 또 만나요~".bright_green().bold());
    Ok(())
}

/// Run turns until the user ends the debate. Returns false on end of input.
async fn debate_loop(bot: &mut DebateBot, input: &mut Input, debug: bool) -> CliResult<bool> {
    let timeout = bot.config().session.stream_timeout();

    loop {
        let remaining = bot.turns_remaining();
        let label = format!("\n{} ({}회 남음): ", "당신".bright_cyan().bold(), remaining);
        let Some(line) = prompt(input, &label).await? else {
            return Ok(false);
        };
        let line = line.trim();

        if END_COMMANDS.contains(&line) {
            return Ok(true);
        }
        if line.is_empty() {
            continue;
        }

        let mut stream = match bot.chat_stream(line) {
            Ok(stream) => stream.with_timeout(timeout),
            Err(e) => {
                report_error(&e, debug);
                continue;
            }
        };

        print!("{} ", "AI:".bright_magenta().bold());
        flush();
        while let Some(item) = stream.next().await {
            match item {
                Ok(fragment) => {
                    print!("{}", fragment);
                    flush();
                }
                Err(e) => {
                    println!();
                    report_error(&e, debug);
                }
            }
        }
        println!();
    }
}

/// Walk the user through character, category, topic and stance selection.
async fn select_debate(
    bot: &DebateBot,
    input: &mut Input,
) -> CliResult<Option<(String, String, Stance)>> {
    let Some(content) = bot.content() else {
        return Ok(None);
    };

    println!();
    println!("{}", "토론 상대의 말투를 선택해주세요:".bold());
    let personas: Vec<&str> = content
        .personas()
        .iter()
        .map(|p| p.char_type.as_str())
        .collect();
    let Some(persona) = choose(input, &personas).await? else {
        return Ok(None);
    };

    println!();
    println!("{}", "토론 주제의 유형을 선택해주세요:".bold());
    let categories = content.categories();
    let Some(category) = choose(input, &categories).await? else {
        return Ok(None);
    };

    println!();
    println!("{}", "토론하고 싶은 주제를 선택하세요:".bold());
    let topics: Vec<_> = content.topics_in_category(category).collect();
    for (i, topic) in topics.iter().enumerate() {
        println!("  {}. {}", i + 1, topic.keyword.bright_cyan());
        if !topic.summary.is_empty() {
            println!("     {}", topic.summary.dimmed());
        }
    }
    let Some(index) = choose_index(input, topics.len()).await? else {
        return Ok(None);
    };
    let topic = topics[index];

    println!();
    println!("{} {}", "주제:".bold(), topic.topic.bright_white());
    println!("{}", "당신의 입장을 선택하세요:".bold());
    let stances: Vec<&str> = Stance::ALL.iter().map(|s| s.label()).collect();
    let Some(stance) = choose(input, &stances).await? else {
        return Ok(None);
    };

    Ok(Some((
        persona.to_string(),
        topic.keyword.clone(),
        stance.parse()?,
    )))
}

/// Print numbered options and return the chosen one.
async fn choose<'a>(input: &mut Input, options: &[&'a str]) -> CliResult<Option<&'a str>> {
    for (i, option) in options.iter().enumerate() {
        println!("  {}. {}", i + 1, option.bright_cyan());
    }
    Ok(choose_index(input, options.len())
        .await?
        .map(|index| options[index]))
}

async fn choose_index(input: &mut Input, len: usize) -> CliResult<Option<usize>> {
    if len == 0 {
        println!("{}", "선택할 수 있는 항목이 없습니다.".yellow());
        return Ok(None);
    }

    loop {
        let Some(line) = prompt(input, "번호를 입력하세요: ").await? else {
            return Ok(None);
        };
        match line.trim().parse::<usize>() {
            Ok(n) if (1..=len).contains(&n) => return Ok(Some(n - 1)),
            Ok(_) => println!("{}", "올바른 번호를 입력해주세요.".yellow()),
            Err(_) => println!("{}", "숫자를 입력해주세요.".yellow()),
        }
    }
}

async fn prompt(input: &mut Input, label: &str) -> CliResult<Option<String>> {
    print!("{}", label);
    flush();
    Ok(input.next_line().await?)
}

fn flush() {
    std::io::stdout().flush().ok();
}

fn report_error(e: &DebateError, debug: bool) {
    let message = match e {
        DebateError::TurnLimitReached { .. } => format!(
            "입력 횟수 제한을 초과했습니다. '{}'를 입력해서 토론 점수를 확인해보세요!",
            END_COMMANDS[0]
        ),
        DebateError::InputTooLong { max, .. } => {
            format!("입력 수를 초과했습니다. {}자 이내로 짧게 입력해주세요.", max)
        }
        DebateError::TimeoutExceeded(_) => {
            "응답이 너무 오래 걸립니다. 잠시 후 다시 시도해 주세요.".to_string()
        }
        DebateError::StreamTransport(msg) if msg.contains("overloaded") => {
            "서버가 현재 과부하 상태입니다. 잠시 후 다시 시도해 주세요.".to_string()
        }
        DebateError::StreamTransport(_) => "대화 생성 중 오류가 발생했습니다.".to_string(),
        DebateError::SelectionNotFound { .. } => {
            format!("{} 다시 선택해주세요.", e)
        }
        other => other.to_string(),
    };

    eprintln!("{}", message.yellow());
    if debug {
        eprintln!("{}", format!("{:?}", e).dimmed());
    }
}

fn print_banner() {
    println!();
    println!("{}", "═".repeat(70).bright_blue());
    println!("{}", "  TODOK - 토론 연습".bright_blue().bold());
    println!("{}", "═".repeat(70).bright_blue());
}

fn print_evaluation(result: &EvaluationResult) {
    println!();
    println!("{}", "═".repeat(70).bright_blue());
    println!("{}", "  토론 평가 결과".bright_blue().bold());
    println!("{}", "═".repeat(70).bright_blue());

    match result {
        EvaluationResult::Report(report) => {
            for score in &report.categories {
                println!();
                println!(
                    "{} {}",
                    score.category.label().bright_cyan().bold(),
                    format!("{} / 25", score.score).yellow()
                );
                if !score.comment.is_empty() {
                    println!("  {}", score.comment);
                }
                if !score.advice.is_empty() {
                    println!("  {} {}", "조언:".dimmed(), score.advice);
                }
            }
            println!();
            println!(
                "{}",
                format!("총점: {} / 100", report.total).bright_green().bold()
            );
        }
        EvaluationResult::Failed { error, .. } => {
            println!(
                "{} {}",
                "평가 중 오류가 발생했습니다:".red().bold(),
                error
            );
        }
    }
}
