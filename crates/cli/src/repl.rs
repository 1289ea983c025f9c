use anyhow::Context;
use chrono::NaiveDate;
use kabu_core::domain::catalog::IndustryFilter;
use kabu_core::mode::{AnalysisMode, InputForm};
use kabu_core::orchestrator::{AnalysisDisplay, CompanyInfo};
use kabu_core::session::payload::{AnalysisInputs, InstrumentToggles};
use kabu_core::viewport::{HeadlessViewport, ViewportRange};
use kabu_core::{AnalysisError, AnalysisOrchestrator};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

const HELP: &str = "\
commands:
  industries                 list industries
  industry <name|all>        filter the instrument list
  list                       list instruments (current filter)
  select <ticker>            load an instrument
  recent                     recently used instruments
  pick <n>                   load the n-th recent instrument (clears the filter)
  mode [tab]                 show or switch mode: full tech volume market total reresearch-auto reresearch-manual
  topic <name>               add/remove a market topic
  keyword <text>             market free keyword (empty clears)
  question <text>            question for manual re-research
  toggle <option>            flip an option of the current mode (beginner deep lite technical short mid sector)
  run                        run the current mode (Ctrl-C cancels)
  history                    list reports
  check <n>                  toggle report n for total / re-research
  open <n>                   show report n again
  export [dir]               save the shown report as PDF
  show [yyyy-mm-dd]          chart window, stats and OHLC readout
  scroll <from> <to>         pan the price chart to a bar range
  quit";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    Industries,
    Industry(IndustryFilter),
    List,
    Select(String),
    Recent,
    Pick(usize),
    Mode(Option<AnalysisMode>),
    Topic(String),
    Keyword(String),
    Question(String),
    Toggle(String),
    Run,
    History,
    Check(usize),
    Open(usize),
    Export(Option<PathBuf>),
    Show(Option<NaiveDate>),
    Scroll { from: f64, to: f64 },
    Quit,
}

/// Parses one input line. Blank lines yield `None`.
pub fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (line, ""),
    };

    let command = match head.to_ascii_lowercase().as_str() {
        "help" | "?" => Command::Help,
        "industries" => Command::Industries,
        "industry" => Command::Industry(IndustryFilter::parse(rest)),
        "list" | "ls" => Command::List,
        "select" | "load" => Command::Select(required(rest, "select <ticker>")?.to_string()),
        "recent" => Command::Recent,
        "pick" => Command::Pick(index(rest, "pick <n>")?),
        "mode" => Command::Mode(if rest.is_empty() {
            None
        } else {
            Some(rest.parse()?)
        }),
        "topic" => Command::Topic(required(rest, "topic <name>")?.to_string()),
        "keyword" => Command::Keyword(rest.to_string()),
        "question" | "ask" => Command::Question(rest.to_string()),
        "toggle" => Command::Toggle(required(rest, "toggle <option>")?.to_ascii_lowercase()),
        "run" => Command::Run,
        "history" | "hist" => Command::History,
        "check" => Command::Check(index(rest, "check <n>")?),
        "open" => Command::Open(index(rest, "open <n>")?),
        "export" => Command::Export((!rest.is_empty()).then(|| PathBuf::from(rest))),
        "show" => Command::Show(if rest.is_empty() {
            None
        } else {
            Some(
                NaiveDate::parse_from_str(rest, "%Y-%m-%d")
                    .map_err(|err| format!("invalid date {rest}: {err}"))?,
            )
        }),
        "scroll" => {
            let mut parts = rest.split_whitespace().map(str::parse::<f64>);
            match (parts.next(), parts.next(), parts.next()) {
                (Some(Ok(from)), Some(Ok(to)), None) if from < to => Command::Scroll { from, to },
                _ => return Err("usage: scroll <from> <to>".to_string()),
            }
        }
        "quit" | "exit" | "q" => Command::Quit,
        other => return Err(format!("unknown command: {other} (try `help`)")),
    };
    Ok(Some(command))
}

fn required<'a>(rest: &'a str, usage: &str) -> Result<&'a str, String> {
    if rest.is_empty() {
        Err(format!("usage: {usage}"))
    } else {
        Ok(rest)
    }
}

fn index(rest: &str, usage: &str) -> Result<usize, String> {
    required(rest, usage)?
        .parse()
        .map_err(|_| format!("usage: {usage}"))
}

/// Flips one option of `mode`'s input form and returns its new value.
pub fn toggle_option(
    inputs: &mut AnalysisInputs,
    mode: AnalysisMode,
    option: &str,
) -> Result<bool, String> {
    fn per_instrument<'a>(toggles: &'a mut InstrumentToggles, option: &str) -> Option<&'a mut bool> {
        match option {
            "beginner" => Some(&mut toggles.beginner_mode),
            "deep" => Some(&mut toggles.deep_analysis),
            "lite" => Some(&mut toggles.lite_model),
            _ => None,
        }
    }

    let flag = match mode {
        AnalysisMode::Full | AnalysisMode::Technical | AnalysisMode::Volume => {
            per_instrument(&mut inputs.instrument, option)
        }
        AnalysisMode::ReresearchAuto | AnalysisMode::ReresearchManual => {
            per_instrument(&mut inputs.reresearch, option)
        }
        AnalysisMode::Market => {
            let toggles = &mut inputs.market;
            match option {
                "beginner" => Some(&mut toggles.beginner_mode),
                "deep" => Some(&mut toggles.deep_analysis),
                "technical" => Some(&mut toggles.technical_mode),
                "short" => Some(&mut toggles.short_term),
                "mid" => Some(&mut toggles.mid_term),
                "sector" => Some(&mut toggles.sector_view),
                _ => None,
            }
        }
        AnalysisMode::Total => None,
    };

    let flag = flag.ok_or_else(|| format!("{mode} has no option {option}"))?;
    *flag = !*flag;
    Ok(*flag)
}

pub struct Repl {
    orchestrator: AnalysisOrchestrator,
    price: Arc<HeadlessViewport>,
    kairi: Arc<HeadlessViewport>,
    export_dir: PathBuf,
}

impl Repl {
    pub fn new(
        orchestrator: AnalysisOrchestrator,
        price: Arc<HeadlessViewport>,
        kairi: Arc<HeadlessViewport>,
        export_dir: PathBuf,
    ) -> Self {
        Self {
            orchestrator,
            price,
            kairi,
            export_dir,
        }
    }

    pub async fn run(&mut self) -> anyhow::Result<()> {
        println!("kabu: type `help` for commands");
        self.print_recent();

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            print_prompt(self.orchestrator.mode());
            let Some(line) = lines.next_line().await.context("failed to read stdin")? else {
                break;
            };
            match parse_command(&line) {
                Ok(Some(Command::Quit)) => break,
                Ok(Some(command)) => self.execute(command).await?,
                Ok(None) => {}
                Err(message) => println!("{message}"),
            }
        }
        Ok(())
    }

    /// Runs one command. Only I/O failures of the terminal itself are
    /// returned; analysis errors are printed.
    pub async fn execute(&mut self, command: Command) -> anyhow::Result<()> {
        match command {
            Command::Help => println!("{HELP}"),
            Command::Industries => {
                for industry in self.orchestrator.catalog().industries() {
                    println!("  {industry}");
                }
            }
            Command::Industry(filter) => {
                self.orchestrator.set_industry_filter(filter);
                self.print_instruments();
            }
            Command::List => self.print_instruments(),
            Command::Select(ticker) => {
                let result = self.orchestrator.select_instrument(&ticker).await;
                self.after_load(result);
            }
            Command::Recent => self.print_recent(),
            Command::Pick(n) => {
                let result = self.orchestrator.select_recent(n).await;
                self.after_load(result);
            }
            Command::Mode(None) => self.print_mode(),
            Command::Mode(Some(mode)) => {
                self.orchestrator.select_mode(mode);
                self.print_mode();
            }
            Command::Topic(topic) => {
                let on = self.orchestrator.inputs_mut().toggle_topic(&topic);
                println!("topic {topic}: {}", if on { "on" } else { "off" });
            }
            Command::Keyword(keyword) => self.orchestrator.inputs_mut().free_keyword = keyword,
            Command::Question(question) => self.orchestrator.inputs_mut().question = question,
            Command::Toggle(option) => {
                let mode = self.orchestrator.mode();
                match toggle_option(self.orchestrator.inputs_mut(), mode, &option) {
                    Ok(on) => println!("{option}: {}", if on { "on" } else { "off" }),
                    Err(message) => println!("{message}"),
                }
            }
            Command::Run => self.run_analysis().await?,
            Command::History => self.print_history(),
            Command::Check(n) => match self.orchestrator.toggle_history_selected(n) {
                Ok(selected) => println!("#{n} {}", if selected { "checked" } else { "unchecked" }),
                Err(err) => print_error(&err),
            },
            Command::Open(n) => match self.orchestrator.open_history_item(n) {
                Ok(_) => self.print_display(),
                Err(err) => print_error(&err),
            },
            Command::Export(dir) => self.export(dir).await?,
            Command::Show(date) => self.print_chart(date),
            Command::Scroll { from, to } => {
                self.price.scroll_to(ViewportRange::logical(from, to));
                self.print_windows();
            }
            Command::Quit => {}
        }
        Ok(())
    }

    async fn run_analysis(&mut self) -> anyhow::Result<()> {
        let pending = match self.orchestrator.begin_analysis() {
            Ok(pending) => pending,
            Err(err) => {
                print_error(&err);
                return Ok(());
            }
        };
        if let AnalysisDisplay::Loading { message, .. } = self.orchestrator.display() {
            println!("{message}");
        }

        let backend = self.orchestrator.backend();
        let execute = pending.execute(backend.as_ref());
        tokio::pin!(execute);

        let done = loop {
            tokio::select! {
                done = &mut execute => break done,
                signal = tokio::signal::ctrl_c() => {
                    signal.context("failed to listen for Ctrl-C")?;
                    self.orchestrator.cancel_active();
                }
            }
        };

        match self.orchestrator.complete(done) {
            Ok(_) => self.print_display(),
            Err(err) if err.is_cancelled() => println!("cancelled"),
            Err(err) => print_error(&err),
        }
        Ok(())
    }

    async fn export(&self, dir: Option<PathBuf>) -> anyhow::Result<()> {
        let doc = match self.orchestrator.export_document().await {
            Ok(doc) => doc,
            Err(err) => {
                print_error(&err);
                return Ok(());
            }
        };
        let dir = dir.unwrap_or_else(|| self.export_dir.clone());
        let path = dir.join(format!("{}.pdf", sanitize_file_name(&doc.title)));
        std::fs::write(&path, &doc.bytes)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("saved {}", path.display());
        Ok(())
    }

    fn after_load(&self, result: Result<ViewportRange, AnalysisError>) {
        match result {
            Ok(_) => {
                if let Some(series) = self.orchestrator.series() {
                    let name = self
                        .orchestrator
                        .catalog()
                        .find(&series.ticker)
                        .map(|i| i.name.as_str())
                        .unwrap_or("");
                    println!("{} {name}: {} bars", series.ticker, series.len());
                }
                self.print_windows();
                match self.orchestrator.company_info() {
                    Some(CompanyInfo::Loaded { text, .. }) => println!("{text}"),
                    Some(CompanyInfo::Failed { message, .. }) => println!("{message}"),
                    None => {}
                }
            }
            Err(err) => print_error(&err),
        }
    }

    fn print_instruments(&self) {
        for instrument in self.orchestrator.visible_instruments() {
            println!(
                "  {:<8} {}  [{}]",
                instrument.ticker, instrument.name, instrument.industry
            );
        }
    }

    fn print_recent(&self) {
        let recent = self.orchestrator.recency();
        if recent.is_empty() {
            return;
        }
        println!("recent:");
        for (i, entry) in recent.entries().iter().enumerate() {
            println!("  {i}: {} {}", entry.ticker, entry.name);
        }
    }

    fn print_mode(&self) {
        let visibility = self.orchestrator.visibility();
        let inputs = self.orchestrator.inputs();
        println!("mode: {} ({})", self.orchestrator.mode(), visibility.guide);
        match visibility.form {
            None => println!("  options: {:?}", inputs.instrument),
            Some(InputForm::MarketTopics) => {
                println!("  topics: {:?} keyword: {:?}", inputs.topics, inputs.free_keyword);
                println!("  options: {:?}", inputs.market);
            }
            Some(InputForm::HistorySelection) => {
                println!("  checked reports: {}", self.orchestrator.history().selected_count());
            }
            Some(InputForm::Reresearch { question }) => {
                println!("  checked reports: {}", self.orchestrator.history().selected_count());
                if question {
                    println!("  question: {:?}", inputs.question);
                }
                println!("  options: {:?}", inputs.reresearch);
            }
        }
    }

    fn print_history(&self) {
        let history = self.orchestrator.history();
        if history.is_empty() {
            println!("no reports yet");
            return;
        }
        for (i, item) in history.items().iter().enumerate() {
            println!(
                "  [{}] {i}: {}  {}",
                if item.is_selected() { "x" } else { " " },
                item.title(),
                item.timestamp().format("%Y-%m-%d %H:%M")
            );
        }
    }

    fn print_display(&self) {
        match self.orchestrator.display() {
            AnalysisDisplay::Hidden => {}
            AnalysisDisplay::Loading { message, .. } => println!("{message}"),
            AnalysisDisplay::Report {
                raw, export_title, ..
            } => {
                println!("{raw}");
                println!("\n(export as {export_title})");
            }
            AnalysisDisplay::Failed { message } => println!("{message}"),
        }
    }

    fn print_windows(&self) {
        println!(
            "  price window: {}  kairi window: {}",
            describe_range(self.price.visible_range()),
            describe_range(self.kairi.visible_range())
        );
    }

    fn print_chart(&self, date: Option<NaiveDate>) {
        let Some(series) = self.orchestrator.series() else {
            print_error(&AnalysisError::from(
                kabu_core::ValidationError::NoInstrument,
            ));
            return;
        };
        self.print_windows();

        let stats = &series.data.stats;
        println!(
            "  high {:.1} ({})  low {:.1} ({})",
            stats.max_price, stats.max_date, stats.min_price, stats.min_date
        );
        println!(
            "  market cap {}  PER {}  PBR {}  ROE {}  ROA {}  yield {}  payout {}  ex-div {}",
            stats.market_cap,
            stats.per,
            stats.pbr,
            stats.roe,
            stats.roa,
            stats.dividend_yield,
            stats.payout_ratio,
            stats.ex_div_date
        );

        let Some(time) = date.or_else(|| series.data.candles.last().map(|c| c.time)) else {
            return;
        };
        match self.orchestrator.ohlc_readout(time) {
            Some(r) => {
                println!(
                    "  {}  O {:.1}  H {:.1}  L {:.1}  C {:.1}  {:+.2}%",
                    r.time, r.open, r.high, r.low, r.close, r.change_pct
                );
                println!(
                    "  SMA5 {}  SMA25 {}  SMA75 {}  kairi25 {}",
                    indicator(r.sma5),
                    indicator(r.sma25),
                    indicator(r.sma75),
                    indicator(r.kairi25)
                );
            }
            None => println!("  no bar on {time}"),
        }
    }
}

fn indicator(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.2}"))
}

fn print_prompt(mode: AnalysisMode) {
    use std::io::Write;
    print!("[{mode}]> ");
    let _ = std::io::stdout().flush();
}

fn print_error(err: &AnalysisError) {
    if let Some(message) = err.user_message() {
        println!("{message}");
    }
    tracing::debug!(error = %err, "command failed");
}

fn describe_range(range: Option<ViewportRange>) -> String {
    match range {
        Some(ViewportRange::Logical { from, to }) => format!("[{from:.0}, {to:.0}]"),
        Some(ViewportRange::Time { from, to }) => format!("[{from}, {to}]"),
        None => "-".to_string(),
    }
}

fn sanitize_file_name(title: &str) -> String {
    title
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '-',
            c => c,
        })
        .collect()
}
