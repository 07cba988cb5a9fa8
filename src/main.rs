//! trade-journal command line
//!
//! Manage users, log and import trades, and print dashboards.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use trade_journal::calc::{calculate_profit_loss, classify_instrument, contract_size, pips};
use trade_journal::commands::{self, DateRange};
use trade_journal::models::{
    Actor, CreateTradeInput, Direction, RegisterUserInput, Role, Trade, TradeFilters, TradeUpdate,
    UpdateSettingsInput, User,
};
use trade_journal::parsers::dates::{day_of, parse_datetime};
use trade_journal::{AppConfig, Database, SessionStore};

const PASSWORD_ENV: &str = "TRADE_JOURNAL_PASSWORD";

#[derive(Parser, Debug)]
#[command(name = "trade-journal")]
#[command(about = "Trading journal with MetaTrader import", long_about = None)]
struct Cli {
    /// Path to JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database file (overrides config)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// E-mail of the user to act as
    #[arg(short, long, global = true)]
    user: Option<String>,

    /// Password (or set TRADE_JOURNAL_PASSWORD)
    #[arg(long, global = true)]
    password: Option<String>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage accounts
    #[command(subcommand)]
    User(UserCommand),
    /// Log and edit trades
    #[command(subcommand)]
    Trade(TradeCommand),
    /// Import a MetaTrader export (.csv, .xml, .html) or a journal CSV template
    Import {
        file: PathBuf,
        /// Validate against the journal CSV template
        #[arg(long)]
        strict: bool,
        /// Show what would be imported without writing
        #[arg(long, conflicts_with = "strict")]
        preview: bool,
    },
    /// Dashboard statistics
    Stats {
        /// today, week, month, 3months, 6months, year or all
        #[arg(short, long, default_value = "all")]
        range: DateRange,
    },
    /// Profit/loss calculator
    Pnl {
        #[arg(long)]
        symbol: String,
        #[arg(long = "type")]
        direction: Direction,
        #[arg(long)]
        entry: f64,
        #[arg(long)]
        exit: f64,
        #[arg(long, default_value_t = 1.0)]
        lot: f64,
    },
    /// Site settings
    #[command(subcommand)]
    Settings(SettingsCommand),
    /// Export or restore a JSON backup
    #[command(subcommand)]
    Backup(BackupCommand),
    /// List known hashtags
    Tags,
}

#[derive(Subcommand, Debug)]
enum UserCommand {
    Add {
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: String,
        #[arg(long = "new-password")]
        new_password: String,
    },
    List,
    Role { email: String, role: String },
    Disable { email: String },
    Enable { email: String },
    Remove { email: String },
    /// Set a password (own, or another user's as admin)
    Passwd {
        new_password: String,
        #[arg(long)]
        email: Option<String>,
    },
}

#[derive(Args, Debug)]
struct TradeFields {
    #[arg(long)]
    symbol: Option<String>,
    #[arg(long = "type")]
    direction: Option<Direction>,
    #[arg(long)]
    entry: Option<f64>,
    #[arg(long)]
    exit: Option<f64>,
    #[arg(long)]
    lot: Option<f64>,
    #[arg(long)]
    sl: Option<f64>,
    #[arg(long)]
    tp: Option<f64>,
    /// Entry date, e.g. 2024-03-01 or 2024-03-01 09:30
    #[arg(long)]
    date: Option<String>,
    #[arg(long)]
    exit_date: Option<String>,
    #[arg(long)]
    fees: Option<f64>,
    #[arg(long)]
    notes: Option<String>,
    /// Comma separated hashtags
    #[arg(long)]
    tags: Option<String>,
    #[arg(long)]
    session: Option<String>,
}

#[derive(Subcommand, Debug)]
enum TradeCommand {
    Add(TradeFields),
    List {
        #[arg(long)]
        symbol: Option<String>,
        #[arg(long)]
        tag: Option<String>,
        #[arg(long)]
        limit: Option<i32>,
        #[arg(long, default_value_t = 1)]
        page: i32,
    },
    Show { id: String },
    Edit {
        id: String,
        #[command(flatten)]
        fields: TradeFields,
    },
    Delete { id: String },
    Duplicate { id: String },
    /// Recompute P/L of all your trades
    Recalc,
}

#[derive(Subcommand, Debug)]
enum SettingsCommand {
    Show,
    Set {
        #[arg(long)]
        site_name: Option<String>,
        #[arg(long)]
        currency: Option<String>,
        #[arg(long)]
        lot_size: Option<f64>,
        #[arg(long)]
        allow_registration: Option<bool>,
    },
}

#[derive(Subcommand, Debug)]
enum BackupCommand {
    Export {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    Restore { file: PathBuf },
}

fn parse_timestamp(value: &str) -> Result<i64> {
    parse_datetime(value)
        .map(|dt| dt.and_utc().timestamp())
        .with_context(|| format!("Unrecognised date '{}'", value))
}

fn split_tag_arg(tags: Option<String>) -> Option<Vec<String>> {
    tags.map(|t| t.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
}

fn print_trade(trade: &Trade) {
    let exit = trade.exit_price.map(|p| p.to_string()).unwrap_or_else(|| "open".to_string());
    println!(
        "{:<40} {}  {:<4} {:<10} {:>12} -> {:<12} lot {:<8} P/L {:>12.2}  {}",
        trade.id,
        day_of(trade.entry_date),
        trade.direction,
        trade.symbol,
        trade.entry_price,
        exit,
        trade.quantity,
        trade.profit_loss,
        trade.tags.iter().map(|t| format!("#{}", t)).collect::<Vec<_>>().join(" ")
    );
}

struct App {
    config: AppConfig,
    db: Database,
    email: Option<String>,
    password: Option<String>,
}

impl App {
    /// Signs in with the global `--user` and password.
    fn login(&self) -> Result<User> {
        let email = self.email.as_deref().context("--user <EMAIL> is required for this command")?;
        let password = self
            .password
            .clone()
            .or_else(|| std::env::var(PASSWORD_ENV).ok())
            .with_context(|| format!("--password or {} is required", PASSWORD_ENV))?;
        Ok(commands::authenticate(&self.db, email, &password)?)
    }

    fn actor(&self) -> Result<Actor> {
        Ok(self.login()?.actor())
    }

    fn user_by_email(&self, actor: &Actor, email: &str) -> Result<User> {
        commands::list_users(&self.db, actor)?
            .into_iter()
            .find(|u| u.email.eq_ignore_ascii_case(email.trim()))
            .with_context(|| format!("No user with e-mail {}", email))
    }

    fn run_user(&self, command: UserCommand) -> Result<()> {
        match command {
            UserCommand::Add { email, name, new_password } => {
                let actor = if self.email.is_some() { Some(self.actor()?) } else { None };
                let user = commands::register_user(
                    &self.db,
                    actor.as_ref(),
                    RegisterUserInput { email, display_name: name, password: new_password },
                )?;
                println!("Created {} ({}) with id {}", user.email, user.role, user.id);
            }
            UserCommand::List => {
                for user in commands::list_users(&self.db, &self.actor()?)? {
                    println!(
                        "{:<36} {:<30} {:<6} {}{}",
                        user.id,
                        user.email,
                        user.role,
                        user.display_name,
                        if user.disabled { " (disabled)" } else { "" }
                    );
                }
            }
            UserCommand::Role { email, role } => {
                let role = match role.to_lowercase().as_str() {
                    "admin" => Role::Admin,
                    "user" => Role::User,
                    other => bail!("Role must be admin or user, got '{}'", other),
                };
                let actor = self.actor()?;
                let target = self.user_by_email(&actor, &email)?;
                let user = commands::set_role(&self.db, &actor, &target.id, role)?;
                println!("{} is now {}", user.email, user.role);
            }
            UserCommand::Disable { email } => self.set_disabled(&email, true)?,
            UserCommand::Enable { email } => self.set_disabled(&email, false)?,
            UserCommand::Remove { email } => {
                let actor = self.actor()?;
                let target = self.user_by_email(&actor, &email)?;
                commands::delete_user(&self.db, &actor, &target.id)?;
                println!("Removed {}", target.email);
            }
            UserCommand::Passwd { new_password, email } => {
                let actor = self.actor()?;
                let target_id = match email {
                    Some(email) => self.user_by_email(&actor, &email)?.id,
                    None => actor.user_id.clone(),
                };
                commands::reset_password(&self.db, &actor, &target_id, &new_password)?;
                println!("Password updated");
            }
        }
        Ok(())
    }

    fn set_disabled(&self, email: &str, disabled: bool) -> Result<()> {
        let actor = self.actor()?;
        let target = self.user_by_email(&actor, email)?;
        let user = commands::set_disabled(&self.db, &actor, &target.id, disabled)?;
        println!("{} {}", user.email, if user.disabled { "disabled" } else { "enabled" });
        Ok(())
    }

    fn run_trade(&self, command: TradeCommand) -> Result<()> {
        let actor = self.actor()?;
        match command {
            TradeCommand::Add(fields) => {
                let input = CreateTradeInput {
                    symbol: fields.symbol.context("--symbol is required")?,
                    direction: fields.direction,
                    entry_price: fields.entry.context("--entry is required")?,
                    exit_price: fields.exit,
                    quantity: match fields.lot {
                        Some(lot) => lot,
                        None => commands::get_settings(&self.db)?.default_lot_size,
                    },
                    stop_loss: fields.sl,
                    take_profit: fields.tp,
                    entry_date: match fields.date {
                        Some(date) => parse_timestamp(&date)?,
                        None => chrono::Utc::now().timestamp(),
                    },
                    exit_date: fields.exit_date.as_deref().map(parse_timestamp).transpose()?,
                    fees: fields.fees.unwrap_or(0.0),
                    notes: fields.notes.unwrap_or_default(),
                    tags: split_tag_arg(fields.tags).unwrap_or_default(),
                    session: fields.session,
                };
                print_trade(&commands::create_trade(&self.db, &actor, input)?);
            }
            TradeCommand::List { symbol, tag, limit, page } => {
                let filters = TradeFilters {
                    symbol,
                    tag,
                    page: limit.map(|_| page),
                    limit,
                    ..Default::default()
                };
                let trades = commands::list_trades(&self.db, &actor, &filters)?;
                for trade in &trades {
                    print_trade(trade);
                }
                println!("{} trades", trades.len());
            }
            TradeCommand::Show { id } => {
                let trade = commands::get_trade(&self.db, &actor, &id)?;
                println!("{}", serde_json::to_string_pretty(&trade)?);
            }
            TradeCommand::Edit { id, fields } => {
                let update = TradeUpdate {
                    symbol: fields.symbol,
                    direction: fields.direction,
                    entry_price: fields.entry,
                    exit_price: fields.exit,
                    quantity: fields.lot,
                    stop_loss: fields.sl,
                    take_profit: fields.tp,
                    entry_date: fields.date.as_deref().map(parse_timestamp).transpose()?,
                    exit_date: fields.exit_date.as_deref().map(parse_timestamp).transpose()?,
                    fees: fields.fees,
                    notes: fields.notes,
                    tags: split_tag_arg(fields.tags),
                    session: fields.session,
                };
                print_trade(&commands::update_trade(&self.db, &actor, &id, update)?);
            }
            TradeCommand::Delete { id } => {
                commands::delete_trade(&self.db, &actor, &id)?;
                println!("Deleted {}", id);
            }
            TradeCommand::Duplicate { id } => {
                print_trade(&commands::duplicate_trade(&self.db, &actor, &id)?);
            }
            TradeCommand::Recalc => {
                let changed = commands::recalculate_trades(&self.db, &actor)?;
                println!("{} trades updated", changed);
            }
        }
        Ok(())
    }

    fn run_import(&self, file: PathBuf, strict: bool, preview: bool) -> Result<()> {
        let actor = self.actor()?;
        let batch_size = self.config.import_batch_size;

        if strict {
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let result = commands::import_strict_csv(&self.db, &actor, &content, batch_size)?;
            println!("Imported {} trades, {} duplicates", result.imported, result.duplicates);
            for row in &result.invalid_rows {
                println!("Line {}: {}", row.line, row.errors.join("; "));
            }
        } else if preview {
            let format = commands::detect_format(&file)?;
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let preview = commands::preview_import(&self.db, &actor.user_id, format, &content)?;
            for row in &preview.trades {
                let t = &row.trade;
                println!(
                    "{} {} {:<4} {:<10} {} -> {:?} lot {} P/L {:.2}{}",
                    if row.is_duplicate { "dup" } else { "new" },
                    day_of(t.entry_date),
                    t.direction,
                    t.symbol,
                    t.entry_price,
                    t.exit_price,
                    t.lot_size,
                    t.profit_loss,
                    if t.commission > 0.0 { format!(" (commission {:.2})", t.commission) } else { String::new() }
                );
            }
            for skip in &preview.skipped {
                println!("skip row {}: {}", skip.row, skip.reason);
            }
        } else {
            let result = commands::import_file(&self.db, &actor, &file, batch_size)?;
            println!(
                "Imported {} trades, {} duplicates, {} skipped",
                result.imported, result.duplicates, result.skipped
            );
            for error in &result.errors {
                println!("  {}", error);
            }
        }
        Ok(())
    }

    fn run_stats(&self, range: DateRange) -> Result<()> {
        let user = self.login()?;
        let mut session = SessionStore::new(&self.db);
        session.load(&user.id)?;
        let trades = session.trades();

        let stats = commands::dashboard_stats(trades, range);
        let currency = commands::get_settings(&self.db)?.default_currency;

        println!("\n{}", "=".repeat(50));
        println!("DASHBOARD ({})", range);
        println!("{}", "=".repeat(50));
        println!("Closed Trades:      {}", stats.total_trades);
        println!("Open Trades:        {}", stats.open_trades);
        println!("Wins/Losses/BE:     {}/{}/{}", stats.wins, stats.losses, stats.breakevens);
        println!("Win Rate:           {:.2}%", stats.win_rate);
        println!("Total P/L:          {:.2} {}", stats.total_pnl, currency);
        println!("Net P/L:            {:.2} {}", stats.net_pnl, currency);
        println!("Profit Factor:      {:.2}", stats.profit_factor);
        println!("Average Win:        {:.2}", stats.avg_win);
        println!("Average Loss:       {:.2}", stats.avg_loss);
        println!("Best Trade:         {:.2}", stats.best_trade);
        println!("Worst Trade:        {:.2}", stats.worst_trade);

        println!("\nEquity curve");
        for point in commands::equity_curve(trades, range) {
            println!(
                "  {}  {:>10.2}  ({:+.2}, {} trades)",
                point.date, point.cumulative_pnl, point.daily_pnl, point.trade_count
            );
        }

        println!("\nBy instrument");
        for row in commands::instrument_breakdown(trades, range) {
            println!("  {:<10} {:>4} trades  {:>6.2}%  {:>10.2}", row.key, row.trades, row.win_rate, row.total_pnl);
        }

        println!("\nBy tag");
        for row in commands::tag_breakdown(trades, range) {
            println!("  #{:<12} {:>4} trades  {:>6.2}%  {:>10.2}", row.key, row.trades, row.win_rate, row.total_pnl);
        }
        Ok(())
    }

    fn run_settings(&self, command: SettingsCommand) -> Result<()> {
        let settings = match command {
            SettingsCommand::Show => commands::get_settings(&self.db)?,
            SettingsCommand::Set { site_name, currency, lot_size, allow_registration } => {
                commands::update_settings(
                    &self.db,
                    &self.actor()?,
                    UpdateSettingsInput {
                        site_name,
                        default_currency: currency,
                        default_lot_size: lot_size,
                        allow_registration,
                    },
                )?
            }
        };
        println!("{}", serde_json::to_string_pretty(&settings)?);
        Ok(())
    }

    fn run_backup(&self, command: BackupCommand) -> Result<()> {
        let actor = self.actor()?;
        match command {
            BackupCommand::Export { output } => {
                let json = commands::export_all_data(&self.db, &actor)?;
                match output {
                    Some(path) => {
                        std::fs::write(&path, json)
                            .with_context(|| format!("Failed to write {}", path.display()))?;
                        println!("Backup written to {}", path.display());
                    }
                    None => println!("{}", json),
                }
            }
            BackupCommand::Restore { file } => {
                let json = std::fs::read_to_string(&file)
                    .with_context(|| format!("Failed to read {}", file.display()))?;
                let summary = commands::import_all_data(&self.db, &actor, &json)?;
                println!(
                    "Restored {} trades ({} skipped), {} users ({} skipped)",
                    summary.trades_restored,
                    summary.trades_skipped,
                    summary.users_restored,
                    summary.users_skipped
                );
            }
        }
        Ok(())
    }
}

fn print_pnl(symbol: &str, direction: Direction, entry: f64, exit: f64, lot: f64) -> Result<()> {
    let class = classify_instrument(symbol);
    let profit_loss = calculate_profit_loss(entry, exit, lot, direction, symbol)?;
    println!("Instrument:     {} ({})", symbol, class);
    println!("Contract size:  {}", contract_size(class, symbol));
    if let Some(pips) = pips(entry, exit, direction, symbol) {
        println!("Pips:           {:.1}", pips);
    }
    println!("Profit/Loss:    {:.2}", profit_loss);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logger
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    if let Command::Pnl { symbol, direction, entry, exit, lot } = &cli.command {
        return print_pnl(symbol, *direction, *entry, *exit, *lot);
    }

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        config.database_path = db;
    }

    log::debug!("Opening database {}", config.database_path.display());
    let db = Database::new(config.database_path_str()?).with_context(|| {
        format!(
            "Database initialization failed; backups are kept next to {}",
            config.database_path.display()
        )
    })?;

    let app = App { config, db, email: cli.user, password: cli.password };

    match cli.command {
        Command::User(command) => app.run_user(command),
        Command::Trade(command) => app.run_trade(command),
        Command::Import { file, strict, preview } => app.run_import(file, strict, preview),
        Command::Stats { range } => app.run_stats(range),
        Command::Settings(command) => app.run_settings(command),
        Command::Backup(command) => app.run_backup(command),
        Command::Tags => {
            let mut session = SessionStore::new(&app.db);
            session.load(&app.login()?.id)?;
            for tag in session.known_tags() {
                println!("#{}", tag);
            }
            Ok(())
        }
        Command::Pnl { .. } => Ok(()),
    }
}
