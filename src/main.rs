//! Price Checker CLI
//!
//! Browses the price API's transaction bins from the terminal.
//!
//! Usage:
//!   pricechecker browse
//!   pricechecker ranges
//!   pricechecker top-tokens --limit 20
//!
//! Environment:
//!   PRICECHECK_API_BASE - API base URL (default: http://localhost:8000/api)
//!   PRICECHECK_PAGE_SIZE - Rows per page (default: 20)
//!   PRICECHECK_WINDOW_SIZE - Pages fetched per window (default: 5)
//!   PRICECHECK_SOL_PRICE - SOL/USD rate (default: 133)
//!   PRICECHECK_TAB_ORDER - Bin tab order (default: 4,3,2,5,1,0)

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

use pricechecker::models::{BinId, PriceType, PriceUnit};
use pricechecker::{
    BrowseError, BrowserConfig, Mode, ModeController, PageContent, PageView, PriceApiClient,
    PriceDataSource,
};

#[derive(Parser, Debug)]
#[command(name = "pricechecker")]
#[command(about = "Browse price-binned transaction data page by page")]
struct Args {
    /// Price API base URL
    #[arg(long, env = "PRICECHECK_API_BASE")]
    api_base: Option<String>,

    /// Request timeout in seconds
    #[arg(long, env = "PRICECHECK_TIMEOUT_SECS")]
    timeout_secs: Option<u64>,

    /// Pages fetched together per bin window
    #[arg(long, env = "PRICECHECK_WINDOW_SIZE")]
    window_size: Option<u32>,

    /// Rows per page
    #[arg(long, env = "PRICECHECK_PAGE_SIZE")]
    page_size: Option<u32>,

    /// SOL/USD conversion rate
    #[arg(long, env = "PRICECHECK_SOL_PRICE")]
    sol_price: Option<f64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Interactive browsing session reading commands from stdin
    Browse,
    /// Row distribution across the price bins
    Ranges,
    /// Most frequent tokens
    TopTokens {
        #[arg(long, default_value = "20")]
        limit: u32,
    },
}

/// One line typed in the browse session.
#[derive(Debug, Clone, PartialEq)]
enum Action {
    Page { page: u32, size: Option<u32> },
    Tab(BinId),
    Query,
    Abnormal,
    Reset,
    SolPrice(f64),
    PriceType(PriceType),
    PriceUnit(PriceUnit),
    Token(Option<String>),
    PageSize(u32),
    Tokens,
    Status,
    Help,
    Quit,
}

fn parse_action(line: &str) -> Result<Action, String> {
    let mut parts = line.split_whitespace();
    let cmd = parts.next().ok_or("empty command")?;
    let arg = parts.next();

    fn required<'a>(arg: Option<&'a str>, what: &str) -> Result<&'a str, String> {
        arg.ok_or_else(|| format!("missing {}", what))
    }
    fn number<T: std::str::FromStr>(s: &str) -> Result<T, String>
    where
        T::Err: std::fmt::Display,
    {
        s.parse().map_err(|e| format!("invalid number '{}': {}", s, e))
    }

    let action = match cmd {
        "page" | "p" => Action::Page {
            page: number(required(arg, "page number")?)?,
            size: parts.next().map(number).transpose()?,
        },
        "tab" | "bin" => Action::Tab(required(arg, "bin")?.parse()?),
        "query" | "sample" => Action::Query,
        "abnormal" => Action::Abnormal,
        "reset" => Action::Reset,
        "sol" => Action::SolPrice(number(required(arg, "SOL/USD rate")?)?),
        "type" => Action::PriceType(required(arg, "price type")?.parse()?),
        "unit" => Action::PriceUnit(required(arg, "price unit")?.parse()?),
        "token" => Action::Token(match required(arg, "token or '-'")? {
            "-" => None,
            t => Some(t.to_string()),
        }),
        "size" => Action::PageSize(number(required(arg, "page size")?)?),
        "tokens" => Action::Tokens,
        "status" => Action::Status,
        "help" | "?" => Action::Help,
        "quit" | "exit" | "q" => Action::Quit,
        other => return Err(format!("unknown command '{}' (try 'help')", other)),
    };
    Ok(action)
}

const HELP: &str = "\
commands:
  page N [SIZE]     show page N of the active mode
  tab BIN           switch bin tab (0-5)
  query             draw a random sample
  abnormal          toggle the abnormal-only view
  reset             back to bin browsing, refresh current page
  sol X             set SOL/USD rate
  type buy|sell     set price type
  unit SOL|USD      set price unit
  token ADDR|-      filter samples by token
  size N            set page size
  tokens            list top tokens
  status            show session state
  quit";

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(Level::INFO.into())
                .add_directive("pricechecker=debug".parse().context("bad log directive")?),
        )
        .init();

    let args = Args::parse();
    let cfg = build_config(&args);
    info!(api_base = %cfg.api_base, page_size = cfg.page_size, window_size = cfg.window_size, "Price Checker");

    let client = Arc::new(PriceApiClient::from_config(&cfg)?);

    match args.command {
        Command::Browse => run_browse(client, &cfg).await,
        Command::Ranges => {
            let ranges = client.fetch_price_ranges(&cfg.filters).await?;
            println!("{} rows ({})", ranges.total, ranges.unit);
            for r in ranges.bins {
                println!("  {:<10} {:>10} {:>7.2}%", r.label, r.count, r.percent);
            }
            Ok(())
        }
        Command::TopTokens { limit } => {
            for t in client.fetch_top_tokens(limit).await? {
                println!("{:>8}  {}", t.count, t.token);
            }
            Ok(())
        }
    }
}

fn build_config(args: &Args) -> BrowserConfig {
    let mut cfg = BrowserConfig::from_env();
    if let Some(base) = &args.api_base {
        cfg.api_base = base.trim_end_matches('/').to_string();
    }
    if let Some(secs) = args.timeout_secs.filter(|s| *s > 0) {
        cfg.request_timeout = Duration::from_secs(secs);
    }
    if let Some(w) = args.window_size.filter(|w| *w > 0) {
        cfg.window_size = w;
    }
    if let Some(size) = args.page_size {
        cfg.page_size = size;
    }
    if let Some(p) = args.sol_price {
        cfg.filters.sol_price = p;
    }
    cfg
}

async fn run_browse(client: Arc<PriceApiClient>, cfg: &BrowserConfig) -> Result<()> {
    let mut controller = ModeController::new(client, cfg);
    if let Err(e) = controller.start().await {
        eprintln!("! {}", e);
    }
    notify(controller.settle().await);
    let page_size = controller.page_size();
    show_page(&mut controller, 1, page_size).await;

    println!("{}", HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        if line.trim().is_empty() {
            continue;
        }
        let action = match parse_action(&line) {
            Ok(a) => a,
            Err(e) => {
                eprintln!("! {}", e);
                continue;
            }
        };
        if action == Action::Quit {
            break;
        }
        run_action(&mut controller, action).await;
        notify(controller.settle().await);
    }
    Ok(())
}

async fn run_action(controller: &mut ModeController, action: Action) {
    let result: Result<bool, BrowseError> = match action {
        Action::Page { page, size } => {
            let size = size.unwrap_or_else(|| current_page_size(controller));
            show_page(controller, page, size).await;
            Ok(false)
        }
        Action::Tab(bin) => controller.switch_bin(bin).await.map(|_| true),
        Action::Query => controller.query().await.map(|n| {
            println!("sampled {} rows", n);
            true
        }),
        Action::Abnormal => controller.toggle_abnormal().await.map(|_| true),
        Action::Reset => controller.reset().await.map(|_| true),
        Action::SolPrice(p) => controller.set_sol_price(p).await.map(|_| true),
        Action::PriceType(t) => controller.set_price_type(t).await.map(|_| true),
        Action::PriceUnit(u) => controller.set_price_unit(u).await.map(|_| true),
        Action::Token(t) => {
            controller.set_token(t);
            Ok(false)
        }
        Action::PageSize(size) => controller.set_page_size(size).await.map(|_| true),
        Action::Tokens => controller.load_top_tokens().await.map(|tokens| {
            for t in tokens {
                println!("{:>8}  {}", t.count, t.token);
            }
            false
        }),
        Action::Status => {
            print_status(controller);
            Ok(false)
        }
        Action::Help => {
            println!("{}", HELP);
            Ok(false)
        }
        Action::Quit => Ok(false),
    };

    match result {
        Ok(true) => {
            let page = match controller.mode() {
                Mode::Browse => controller.page(),
                _ => 1,
            };
            let size = current_page_size(controller);
            show_page(controller, page, size).await;
        }
        Ok(false) => {}
        Err(e) => eprintln!("! {}", e),
    }
}

fn current_page_size(controller: &ModeController) -> u32 {
    match controller.mode() {
        Mode::Sample(view) => view.page_size,
        Mode::Abnormal(view) => view.page_size,
        Mode::Browse => controller.page_size(),
    }
}

async fn show_page(controller: &mut ModeController, page: u32, size: u32) {
    let mut view = match controller.request_page(page, size).await {
        Ok(v) => v,
        Err(e) => {
            eprintln!("! {}", e);
            return;
        }
    };
    if view.content.is_miss() {
        println!("loading page {}...", page);
        notify(controller.settle().await);
        view = match controller.request_page(page, size).await {
            Ok(v) => v,
            Err(e) => {
                eprintln!("! {}", e);
                return;
            }
        };
    }
    print_view(controller, &view);
}

fn print_view(controller: &ModeController, view: &PageView) {
    let bin = controller.active_bin();
    println!(
        "[{}] {} | page {}/{} | {} rows",
        view.mode,
        bin.label(),
        view.meta.current,
        view.meta.page_count().max(1),
        view.meta.total
    );
    if let Mode::Sample(sample) = controller.mode() {
        println!("  sampled from {} rows", sample.population);
    }
    if let Some(s) = &view.summary {
        println!(
            "  count={} avg_usd={} min_usd={} max_usd={}",
            s.count,
            fmt_opt(s.avg_usd.or(s.avg)),
            fmt_opt(s.min_usd.or(s.min)),
            fmt_opt(s.max_usd.or(s.max))
        );
    }
    match &view.content {
        PageContent::Ready(rows) if rows.is_empty() => println!("  (no rows)"),
        PageContent::Ready(rows) => {
            for row in rows.iter() {
                let mut line = row.to_string();
                if line.len() > 160 {
                    let cut = (0..=157).rev().find(|i| line.is_char_boundary(*i)).unwrap_or(0);
                    line.truncate(cut);
                    line.push_str("...");
                }
                println!("  {}", line);
            }
        }
        PageContent::Miss => println!("  (still loading)"),
    }
}

fn print_status(controller: &ModeController) {
    let f = controller.filters();
    println!(
        "mode={} bin={} ({}) page={} page_size={} window={} price_type={} unit={} sol={} token={} pending={}",
        controller.mode_kind(),
        controller.active_bin(),
        controller.active_bin().label(),
        controller.page(),
        controller.page_size(),
        controller.coordinator().window_size(),
        f.price_type.as_str(),
        f.price_unit.as_str(),
        f.sol_price,
        controller.token().unwrap_or("-"),
        controller.pending_fetches()
    );
    let stores = controller.coordinator().stores().read();
    for bin in controller.tab_order() {
        let (pages, ranges) = stores
            .bin(*bin)
            .map(|s| {
                let loaded = s.loaded_ranges();
                let ranges = loaded
                    .as_slice()
                    .iter()
                    .map(|w| w.to_string())
                    .collect::<Vec<_>>()
                    .join(" ");
                (loaded.page_count(), ranges)
            })
            .unwrap_or_default();
        println!(
            "  bin {} {:<13} total={:<8} pages={:<4} loaded={}",
            bin,
            bin.label(),
            stores.total(*bin),
            pages,
            ranges
        );
    }
}

fn fmt_opt(v: Option<f64>) -> String {
    v.map(|x| format!("{:.6}", x)).unwrap_or_else(|| "-".to_string())
}

fn notify(errors: Vec<BrowseError>) {
    for e in errors {
        eprintln!("! {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_actions() {
        assert_eq!(parse_action("page 3").unwrap(), Action::Page { page: 3, size: None });
        assert_eq!(
            parse_action("p 2 50").unwrap(),
            Action::Page {
                page: 2,
                size: Some(50)
            }
        );
        assert_eq!(parse_action("tab 5").unwrap(), Action::Tab(BinId(5)));
        assert_eq!(parse_action("token -").unwrap(), Action::Token(None));
        assert_eq!(parse_action("unit sol").unwrap(), Action::PriceUnit(PriceUnit::Sol));
        assert_eq!(parse_action("sol 150.5").unwrap(), Action::SolPrice(150.5));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_action("page").is_err());
        assert!(parse_action("page x").is_err());
        assert!(parse_action("tab 9").is_err());
        assert!(parse_action("fly").is_err());
    }
}
