#![cfg(not(tarpaulin_include))]

use chrono::{Local, NaiveDate};
use sales_dashboard::aggregate::{self, GroupTotal};
use sales_dashboard::auth::ManagerGate;
use sales_dashboard::cache::DatasetCache;
use sales_dashboard::chat::{self, ChatContext, Typewriter};
use sales_dashboard::config::{self, Config};
use sales_dashboard::error::DashboardError;
use sales_dashboard::format::{format_currency, format_percent};
use sales_dashboard::record::{DateFilter, Dimension, Measure, SalesDataset};
use sales_dashboard::view::{self, Panel, Profile, ViewContext};
use sales_dashboard::{downloader, report};

use std::env;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

struct Session {
    config: Config,
    data_path: PathBuf,
    cache: DatasetCache,
    gate: ManagerGate,
    profile: Profile,
    range: Option<DateFilter>,
    unlocked: bool,
}

impl Session {
    fn dataset(&mut self) -> Result<Arc<SalesDataset>, DashboardError> {
        match self.cache.current() {
            Some(data) => Ok(data),
            None => self.cache.get_or_load(&self.data_path),
        }
    }

    fn filtered(&mut self) -> Result<SalesDataset, DashboardError> {
        let data = self.dataset()?;
        Ok(aggregate::filter_range(&data, self.range))
    }
}

fn print_totals(title: &str, rows: &[GroupTotal]) {
    println!("{}", title);
    if rows.is_empty() {
        println!("  (no data)");
    }
    for row in rows {
        println!("  {:<24} {:>14}", row.key, format_currency(row.value));
    }
}

fn print_ranked(rank: usize, key: &str, value: f64) {
    println!("  {:>3}. {:<20} {:>14}", rank, key, format_currency(value));
}

fn print_view(session: &mut Session) -> Result<(), DashboardError> {
    let data = session.dataset()?;
    let ctx = ViewContext::new(session.profile)
        .with_range(session.range)
        .with_threshold(session.config.alerts.threshold)
        .unlocked(session.unlocked);
    let view = view::build_view(&data, &ctx);

    println!("== {} ==", view.profile.title());
    if let Some(notice) = &view.notice {
        println!("{}", notice);
    }
    for card in &view.cards {
        println!("  {:<22} {}", card.label, card.value);
    }
    for panel in &view.panels {
        match panel {
            Panel::Chart { title, series, .. } => print_totals(title, series),
            Panel::GroupedChart { title, table } => {
                println!("{}", title);
                println!("  {:<20} {}", "", table.columns.join(" | "));
                for (row, values) in table.rows.iter().zip(&table.values) {
                    let cells: Vec<String> = values.iter().map(|v| format_currency(*v)).collect();
                    println!("  {:<20} {}", row, cells.join(" | "));
                }
            }
            Panel::Ranking { title, rows } => {
                println!("{}", title);
                for row in rows {
                    print_ranked(row.rank, &row.key, row.value);
                }
            }
            Panel::ComplianceTable { title, rows } => {
                println!("{}", title);
                for (key, amount, target, compliance) in view::compliance_rows(rows) {
                    println!("  {:<20} {:>14} {:>14} {:>10}", key, amount, target, compliance);
                }
            }
            Panel::Alerts { title, flagged, note, .. } => {
                println!("{}", title);
                if let Some(note) = note {
                    println!("  {}", note);
                }
                for (key, pct) in flagged {
                    println!("  {:<24} {:>10}", key, format_percent(*pct));
                }
            }
            other => println!("{} (see the web dashboard)", other.title()),
        }
    }
    Ok(())
}

fn parse_dimension(arg: Option<&str>) -> Result<Dimension, String> {
    let name = arg.ok_or("missing dimension")?;
    Dimension::from_name(name).ok_or_else(|| format!("unknown dimension '{}'", name))
}

fn parse_day(arg: Option<&str>) -> Result<NaiveDate, String> {
    let text = arg.ok_or("missing date")?;
    NaiveDate::parse_from_str(text, "%Y-%m-%d").map_err(|_| format!("invalid date '{}'", text))
}

fn run_command(session: &mut Session, command: &str) -> Result<String, String> {
    let mut parts = command.split_whitespace();
    let name = parts.next().unwrap_or("");
    let rest: Vec<&str> = parts.collect();
    let user = |e: DashboardError| e.user_message();

    match name {
        "kpi" => {
            print_view(session).map_err(user)?;
        }
        "range" => {
            if rest.first() == Some(&"clear") {
                session.range = None;
            } else {
                let start = parse_day(rest.first().copied())?;
                let end = parse_day(rest.get(1).copied())?;
                session.range = Some(DateFilter::new(start, end));
            }
        }
        "profile" => {
            let wanted = rest.join(" ");
            session.profile =
                Profile::from_name(&wanted).ok_or_else(|| format!("unknown profile '{}'", wanted))?;
            print_view(session).map_err(user)?;
        }
        "unlock" => {
            let path = rest.first().ok_or("missing image path")?;
            let photo = std::fs::read(path).map_err(|e| e.to_string())?;
            let grant = session.gate.check(photo).map_err(user)?;
            session.unlocked = true;
            println!("Manager view unlocked ({})", grant.provider);
        }
        "rank" => {
            let dimension = parse_dimension(rest.first().copied())?;
            let data = session.filtered().map_err(user)?;
            for entry in aggregate::rank(&data, dimension, Measure::Amount) {
                print_ranked(entry.rank, &entry.key, entry.value);
            }
        }
        "top" => {
            let dimension = parse_dimension(rest.first().copied())?;
            let n = match rest.get(1) {
                Some(n) => Some(
                    n.parse::<usize>()
                        .map_err(|_| format!("invalid count '{}'", n))?,
                ),
                None => Some(5),
            };
            let data = session.filtered().map_err(user)?;
            let rows = aggregate::top_by(&data, dimension, Measure::Amount, n);
            print_totals(&format!("Top {}", dimension.label().to_lowercase()), &rows);
        }
        "weekday" => {
            let data = session.filtered().map_err(user)?;
            let buckets = aggregate::day_of_week_bucket(&data, Measure::Amount);
            print_totals("Sales by weekday", &buckets.entries);
        }
        "month" => {
            let data = session.filtered().map_err(user)?;
            let buckets = aggregate::month_bucket(&data, Measure::Amount);
            print_totals("Sales by month", &buckets.entries);
        }
        "alerts" => {
            let dimension = parse_dimension(rest.first().copied())?;
            let threshold = rest
                .get(1)
                .ok_or("missing threshold")?
                .parse::<f64>()
                .map_err(|_| "invalid threshold".to_string())?;
            let data = session.filtered().map_err(user)?;
            let flagged = aggregate::compliance_alert(&data, dimension, threshold);
            if flagged.is_empty() {
                println!("Nothing below {}", format_percent(threshold));
            }
            for (key, pct) in flagged {
                println!("  {:<24} {:>10}", key, format_percent(pct));
            }
        }
        "ask" => {
            let question = rest.join(" ");
            let data = session.dataset().map_err(user)?;
            let ctx = ChatContext {
                range: session.range,
                alert_threshold: session.config.alerts.threshold,
            };
            let reply = chat::answer(&question, &data, &ctx);
            let typewriter = Typewriter::new(session.config.typing_delay());
            let mut stdout = io::stdout();
            typewriter.play(&reply.text, &mut stdout).map_err(|e| e.to_string())?;
            println!();
            for suggestion in &reply.suggestions {
                println!("  - {}", suggestion);
            }
        }
        "export" => {
            let kind = rest.first().ok_or("missing export kind")?;
            let path = rest.get(1).ok_or("missing output path")?;
            let data = session.filtered().map_err(user)?;
            let bytes = match (*kind, rest.get(2)) {
                ("pdf", _) => {
                    let today = Local::now().date_naive();
                    report::build_report(&data, session.range, today).map_err(user)?
                }
                ("xlsx", _) => downloader::to_xlsx(&data).map_err(user)?,
                ("csv", None) => downloader::records_to_csv(&data).map_err(user)?.into_bytes(),
                ("csv", Some(dimension)) => {
                    let dimension = parse_dimension(Some(*dimension))?;
                    let totals = aggregate::top_by(&data, dimension, Measure::Amount, None);
                    let key = dimension.label().to_lowercase();
                    downloader::totals_to_csv(&totals, &key, "amount")
                        .map_err(user)?
                        .into_bytes()
                }
                (other, _) => return Err(format!("unknown export kind '{}'", other)),
            };
            std::fs::write(path, bytes).map_err(|e| e.to_string())?;
            println!("Wrote {}", path);
        }
        "reload" => {
            let data = session.cache.reload(&session.data_path).map_err(user)?;
            println!("Reloaded {} records", data.len());
        }
        _ => return Err("invalid command".to_string()),
    }
    Ok("ok".to_string())
}

fn print_help() {
    println!("Commands:");
    println!("  kpi: Show the current profile view");
    println!("  range <start> <end> | range clear: Set or clear the date range");
    println!("  profile <manager|sales|marketing>: Switch profile");
    println!("  unlock <image>: Unlock the manager view with a face photo");
    println!("  rank <dimension>: Rank products, branches or sellers");
    println!("  top <dimension> [n]: Top n groups (default 5)");
    println!("  weekday | month: Sales buckets");
    println!("  alerts <dimension> <threshold>: Groups below the compliance threshold");
    println!("  ask <question>: Ask the assistant");
    println!("  export pdf|xlsx|csv <path>: Export the filtered data");
    println!("  export csv <path> <dimension>: Export sales totals per group");
    println!("  reload: Re-read the data file");
    println!("  q: Quit");
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Vec<String> = env::args().collect();

    let config = config::load_config(None)?;
    let data_path = args.get(1).map(PathBuf::from).unwrap_or_else(|| config.data_path());
    let gate = config.manager_gate()?;
    let mut session = Session {
        cache: DatasetCache::new(config.header_aliases()),
        config,
        data_path,
        gate,
        profile: Profile::SalesDirector,
        range: None,
        unlocked: false,
    };

    // load eagerly so a bad file is reported before the first prompt
    let mut status = match session.dataset() {
        Ok(data) => format!("{} records", data.len()),
        Err(e) => {
            eprintln!("{}", e.user_message());
            String::from("no data")
        }
    };

    let mut start_time = Instant::now();
    loop {
        let elapsed_time = start_time.elapsed().as_secs_f64();
        let range = session
            .range
            .map(|r| format!(" {}..{}", r.start, r.end))
            .unwrap_or_default();
        print!("[{:.1}] ({}{}) > ", elapsed_time, status, range);
        io::stdout().flush()?;

        let mut command = String::new();
        if io::stdin().read_line(&mut command)? == 0 {
            break;
        }
        let command = command.trim();
        start_time = Instant::now();

        if command.is_empty() {
            status = String::from("invalid command");
            continue;
        }
        if command == "help" {
            print_help();
            continue;
        }
        if command == "q" {
            break;
        }

        status = match run_command(&mut session, command) {
            Ok(status) => status,
            Err(message) => {
                println!("{}", message);
                String::from("error")
            }
        };
    }

    Ok(())
}
