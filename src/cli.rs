use std::io::{self, BufRead, Write};

use clap::Parser;
use chronos_seek::config::{init_tracing, SearchArgs};
use chronos_seek::parser::{self, parse_target, Command, Target};
use chronos_seek::{HttpRecordFetcher, Match, Resolver, SearchError};

#[derive(Parser, Clone, Debug)]
#[clap(author, version, about = "Find the record closest to a point in time", long_about = None)]
struct Args {
    /// Target instant (RFC 3339 or `now`). Starts an interactive session when omitted.
    #[clap(long)]
    start: Option<String>,

    #[clap(flatten)]
    search: SearchArgs,
}

type Seeker = Resolver<HttpRecordFetcher>;

#[tokio::main]
async fn main() {
    init_tracing("warn,chronos_seek=warn");

    let args = Args::parse();
    let resolver = match build_resolver(&args.search) {
        Ok(resolver) => resolver,
        Err(e) => {
            eprintln!("[\u{2717}] {}", e);
            std::process::exit(1);
        }
    };

    let code = match args.start {
        Some(raw) => run_once(&resolver, &raw).await,
        None => repl(&resolver).await,
    };
    std::process::exit(code);
}

fn build_resolver(search: &SearchArgs) -> Result<Seeker, Box<dyn std::error::Error>> {
    let options = search.resolver_options()?;
    let fetcher = HttpRecordFetcher::new(search.fetcher_config())?;
    Ok(Resolver::new(fetcher, options))
}

async fn run_once(resolver: &Seeker, raw: &str) -> i32 {
    let target = match parse_target(raw) {
        Ok(target) => target,
        Err(e) => {
            eprintln!("Invalid timestamp format provided for the start argument: {}", e);
            return 1;
        }
    };

    match find(resolver, target).await {
        Ok(found) => {
            print_match(&found);
            0
        }
        Err(e) => {
            eprintln!("[\u{2717}] {}", e);
            2
        }
    }
}

async fn repl(resolver: &Seeker) -> i32 {
    print_banner();
    println!("Type 'HELP' for supported commands or 'EXIT' to quit.\n");

    let stdin = io::stdin();
    let mut buffer = String::new();

    loop {
        print!("seek> ");
        if io::stdout().flush().is_err() {
            return 1;
        }
        buffer.clear();

        match stdin.lock().read_line(&mut buffer) {
            Ok(0) => return 0,
            Ok(_) => {}
            Err(e) => {
                eprintln!("[\u{2717}] {}", e);
                return 1;
            }
        }
        if buffer.trim().is_empty() { continue; }

        match parser::parse_command(&buffer) {
            Ok(Command::Exit) => return 0,
            Ok(Command::Help) => print_help(),
            Ok(Command::Stats) => {
                println!("Cached records: {}", resolver.cache().len());
            }
            Ok(Command::Find { target }) => match find(resolver, target).await {
                Ok(found) => print_match(&found),
                Err(e) => println!("[\u{26a0}\u{fe0f} Error] {}", e),
            },
            Err(e) => {
                println!("[\u{2717} Syntax Error] {}", e);
                if buffer.trim().to_uppercase().starts_with("FIND") {
                    println!("    \u{2139}\u{fe0f}  Hint: timestamps are RFC 3339, e.g. 'FIND 2020-03-01T12:30:00Z' or 'FIND NOW'");
                }
            }
        }
    }
}

async fn find(resolver: &Seeker, target: Target) -> Result<Match, SearchError> {
    resolver.resolve(target.instant()).await
}

fn print_match(found: &Match) {
    println!("Found record with ID={}, isMatch={}", found.record.instance_id, found.exact);
    match serde_json::to_string(&found.record) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("[\u{2717}] could not encode record: {}", e),
    }
}

fn print_banner() {
    println!("\n==================================================");
    println!("   chronos-seek - find a record by its timestamp");
    println!("==================================================\n");
}

fn print_help() {
    println!("\n--- Available Commands ---");
    println!("1. FIND:   FIND 2020-03-01T12:30:00Z   (or FIND NOW)");
    println!("2. STATS:  Number of records cached this session");
    println!("3. EXIT:   Quit\n");
}
