//! CLI 모듈
//!
//! rag 명령어 정의 및 구현
//!
//! - `--query`: 질문 하나에 답하고 종료
//! - 기본: 대화형 모드 (터미널이 아니면 안내만 출력)
//! - `--status`: 설정/백엔드/지식베이스 상태

use std::io::{IsTerminal, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::config::Config;
use crate::engine::RagEngine;
use crate::knowledge::load_documents;

const TITLE: &str = "Agentic RAG Transformer - ML, Sci-Fi, and Cosmos Assistant";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser, Debug, Default)]
#[command(name = "rag")]
#[command(version, about = TITLE, long_about = None)]
#[command(after_help = "Examples:
  rag                           Start interactive mode
  rag --query \"What is ML?\"     Ask a single question
  rag --quiet --query \"test\"    Ask a question with minimal output
  rag --status                  Show configuration and knowledge base status")]
pub struct Cli {
    /// 질문 하나에 답하고 종료 (비대화형)
    #[arg(long)]
    pub query: Option<String>,

    /// 디버그 출력
    #[arg(short, long)]
    pub verbose: bool,

    /// 부가 출력 생략
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// 색상/이모지 출력 끄기 (NO_COLOR 환경변수도 인식)
    #[arg(long)]
    pub no_color: bool,

    /// 터미널이 아니어도 대화형 모드 실행
    #[arg(long)]
    pub force_interactive: bool,

    /// 지식베이스 JSON 파일 경로
    #[arg(long, value_name = "PATH")]
    pub knowledge_base: Option<PathBuf>,

    /// 검색할 문서 수
    #[arg(long, value_name = "N")]
    pub top_k: Option<usize>,

    /// 상태 확인
    #[arg(long)]
    pub status: bool,
}

impl Cli {
    /// 로그 필터 기본 레벨
    pub fn log_level(&self) -> tracing::Level {
        if self.verbose {
            tracing::Level::DEBUG
        } else if self.quiet {
            tracing::Level::ERROR
        } else {
            tracing::Level::WARN
        }
    }

    /// 환경변수 설정에 명령행 옵션 적용
    pub fn apply(&self, config: &mut Config) {
        if let Some(ref path) = self.knowledge_base {
            config.dataset_dir = PathBuf::new();
            config.knowledge_base_file = path.clone();
        }
        if let Some(top_k) = self.top_k {
            config.top_k = top_k;
        }
    }

    fn use_color(&self) -> bool {
        should_use_color(self.no_color, std::env::var_os("NO_COLOR").is_some())
            && std::io::stdout().is_terminal()
    }
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 실행
pub async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::from_env();
    cli.apply(&mut config);

    if cli.status {
        return cmd_status(&config).await;
    }

    if let Some(ref query) = cli.query {
        return cmd_query(&cli, &config, query).await;
    }

    cmd_interactive(&cli, &config).await
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 단일 질의
async fn cmd_query(cli: &Cli, config: &Config, query: &str) -> Result<()> {
    if cli.verbose {
        println!("Processing query: {}", query);
    }

    let engine = RagEngine::from_config(config)
        .await
        .context("Failed to initialize RAG engine")?;
    let response = engine.generate_response(query).await?;
    println!("{}", response);

    Ok(())
}

/// 대화형 모드
async fn cmd_interactive(cli: &Cli, config: &Config) -> Result<()> {
    let color = cli.use_color();

    if !std::io::stdin().is_terminal() && !cli.force_interactive {
        if !cli.quiet {
            println!("{}", format_message(TITLE, "🤖", color));
            println!("Non-interactive environment detected. Use --query for single questions.");
        }
        return Ok(());
    }

    print_welcome(cli, color);

    let engine = RagEngine::from_config(config)
        .await
        .context("Failed to initialize RAG engine")?;

    let prompt = if color { "❯ " } else { "> " };
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("\n{}", prompt);
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            println!("\n{}", format_message("Goodbye!", "👋", color));
            break;
        };

        let query = line.trim();
        match Command::parse(query) {
            Command::Exit => {
                println!("{}", format_message("Goodbye!", "👋", color));
                break;
            }
            Command::Help => print_help(color),
            Command::Empty => println!("Please enter a valid query."),
            Command::Query => {
                if cli.verbose {
                    println!("Processing: {}", query);
                }
                match engine.generate_response(query).await {
                    Ok(response) => println!("\n{}", format_message(&response, "💡", color)),
                    Err(e) => eprintln!("An error occurred: {}", e),
                }
            }
        }
    }

    Ok(())
}

/// 상태 확인
async fn cmd_status(config: &Config) -> Result<()> {
    println!("rag v{}", env!("CARGO_PKG_VERSION"));
    println!();

    let kb_path = config.knowledge_base_path();
    println!("[*] Knowledge base: {}", kb_path.display());

    if config.has_api_key() {
        println!("[OK] API key: set");
        println!("     Embedding: {} ({})", config.embedding_model, config.embedding_dimension);
        println!("     Generator: {}", config.generator_model);
    } else {
        println!("[!] API key: not set (positional retrieval, no generation)");
        println!("    export GEMINI_API_KEY=your-key");
    }

    match load_documents(&kb_path) {
        Ok(Some(documents)) => {
            let bytes = documents.iter().map(String::len).sum();
            println!("[OK] Documents: {} ({})", documents.len(), format_bytes(bytes));
            for (i, doc) in documents.iter().take(3).enumerate() {
                println!("     {}. {}", i + 1, truncate_text(doc, 60));
            }
        }
        Ok(None) => println!("[!] Knowledge base not found, 3 built-in documents will be used"),
        Err(e) => println!("[!] {}", e),
    }

    println!(
        "[*] top_k={}, max_iterations={}, max_length={}, temperature={}",
        config.top_k, config.max_iterations, config.max_length, config.temperature
    );

    Ok(())
}

// ============================================================================
// Interactive Helpers
// ============================================================================

/// 대화형 입력 분류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Exit,
    Help,
    Empty,
    Query,
}

impl Command {
    fn parse(input: &str) -> Self {
        match input.to_lowercase().as_str() {
            "exit" | "quit" | "q" => Command::Exit,
            "help" | "h" => Command::Help,
            "" => Command::Empty,
            _ => Command::Query,
        }
    }
}

fn print_welcome(cli: &Cli, color: bool) {
    if cli.quiet {
        return;
    }

    println!("{}", format_message(TITLE, "🤖", color));
    if cli.verbose {
        println!("Version: {}", env!("CARGO_PKG_VERSION"));
        println!("Knowledge areas: Machine Learning, Science Fiction, Cosmos");
        println!("Available tools: Calculator, Wikipedia, Time/Date");
    }
    println!("Type 'exit' to quit, 'help' for instructions");
}

fn print_help(color: bool) {
    println!("\n{}", format_message("RAG Transformer Help:", "📚", color));
    println!("• Ask about Machine Learning, AI, and Data Science");
    println!("• Inquire about Science Fiction movies and plots");
    println!("• Explore Cosmos, astronomy, and space science");
    println!("• Use built-in tools:");
    println!("  - CALC: <expression>  (e.g., 'CALC: 2**10')");
    println!("  - WIKI: <topic>       (e.g., 'WIKI: Quantum Computing')");
    println!("  - TIME:               (current date and time)");
    println!("• Commands: 'exit'/'quit'/'q' to quit, 'help'/'h' for this message");
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 색상 사용 여부 (`--no-color`와 NO_COLOR 우선)
fn should_use_color(no_color_flag: bool, no_color_env: bool) -> bool {
    !no_color_flag && !no_color_env
}

/// 색상 모드일 때만 이모지 접두사 추가
fn format_message(message: &str, emoji: &str, color: bool) -> String {
    if color && !emoji.is_empty() {
        format!("{} {}", emoji, message)
    } else {
        message.to_string()
    }
}

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// 바이트 크기 포맷팅
fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags() {
        let cli = Cli::try_parse_from([
            "rag",
            "--query",
            "What is ML?",
            "-v",
            "--no-color",
            "--top-k",
            "5",
        ])
        .unwrap();

        assert_eq!(cli.query.as_deref(), Some("What is ML?"));
        assert!(cli.verbose);
        assert!(cli.no_color);
        assert_eq!(cli.top_k, Some(5));
        assert_eq!(cli.log_level(), tracing::Level::DEBUG);
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        assert!(Cli::try_parse_from(["rag", "-v", "-q"]).is_err());
    }

    #[test]
    fn test_log_level() {
        let quiet = Cli::try_parse_from(["rag", "--quiet"]).unwrap();
        assert_eq!(quiet.log_level(), tracing::Level::ERROR);
        assert_eq!(Cli::default().log_level(), tracing::Level::WARN);
    }

    #[test]
    fn test_apply_overrides() {
        let cli = Cli::try_parse_from(["rag", "--knowledge-base", "kb/docs.json", "--top-k", "1"])
            .unwrap();
        let mut config = Config::default();
        cli.apply(&mut config);

        assert_eq!(config.knowledge_base_path(), PathBuf::from("kb/docs.json"));
        assert_eq!(config.top_k, 1);
    }

    #[test]
    fn test_apply_keeps_defaults() {
        let mut config = Config::default();
        Cli::default().apply(&mut config);
        assert_eq!(
            config.knowledge_base_path(),
            PathBuf::from("datasets/knowledge_base.json")
        );
        assert_eq!(config.top_k, 3);
    }

    #[test]
    fn test_interactive_commands() {
        assert_eq!(Command::parse("EXIT"), Command::Exit);
        assert_eq!(Command::parse("quit"), Command::Exit);
        assert_eq!(Command::parse("q"), Command::Exit);
        assert_eq!(Command::parse("Help"), Command::Help);
        assert_eq!(Command::parse("h"), Command::Help);
        assert_eq!(Command::parse(""), Command::Empty);
        assert_eq!(Command::parse("what is a quasar"), Command::Query);
    }

    #[test]
    fn test_color_policy() {
        assert!(should_use_color(false, false));
        assert!(!should_use_color(true, false));
        assert!(!should_use_color(false, true));

        assert_eq!(format_message("Goodbye!", "👋", true), "👋 Goodbye!");
        assert_eq!(format_message("Goodbye!", "👋", false), "Goodbye!");
        assert_eq!(format_message("plain", "", true), "plain");
    }

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("hello", 10), "hello");
        assert_eq!(truncate_text("hello world", 5), "hello...");
        assert_eq!(truncate_text("hello\nworld", 20), "hello world");
        assert_eq!(truncate_text("안녕하세요 세계", 5), "안녕하세요...");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(500), "500 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1048576), "1.00 MB");
    }
}
