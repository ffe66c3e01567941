use crate::dal::DalResults;
use crate::datalink::DatalinkService;
use crate::download;
use crate::error::{Error, Result};
use crate::scs::ConeSearchService;
use crate::sia::{Intersect, SiaQuery, SiaService};
use crate::sla::SlaService;
use crate::ssa::{SsaQuery, SsaService};
use crate::tap::TapService;
use crate::vosi;
use clap::{Args, Parser, Subcommand};
use colored::*;
use comfy_table::presets::UTF8_FULL;
use comfy_table::Table;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// Rows shown before a table listing is truncated.
const MAX_DISPLAY_ROWS: usize = 25;

/// Default HTTP timeout when VODAL_TIMEOUT_SECS is not set.
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// CLI tool for querying astronomical archives over the IVOA protocols
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Print results as JSON instead of a table
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run an ADQL query against a TAP service
    Tap(TapArgs),

    /// Cone search against a catalog service
    Cone(ConeArgs),

    /// Find images overlapping a sky region
    Sia(SiaArgs),

    /// Find spectra near a sky position
    Ssa(SsaArgs),

    /// Find spectral-line transitions in a wavelength range
    Lines(LinesArgs),

    /// Show the VOSI capabilities of a service
    Capabilities(ServiceArgs),

    /// Show the VOSI availability of a service
    Availability(ServiceArgs),

    /// List the datalinks of a dataset
    Datalink(DatalinkArgs),

    /// Download a dataset behind an access URL
    Download(DownloadArgs),
}

#[derive(Args, Debug)]
pub struct TapArgs {
    /// Base URL of the TAP service
    #[arg(short, long)]
    pub url: String,

    /// ADQL query to run
    #[arg(short, long)]
    pub query: String,

    /// Submit as an asynchronous job instead of using the sync endpoint
    #[arg(long)]
    pub async_mode: bool,

    /// Maximum number of rows to request
    #[arg(short, long)]
    pub maxrec: Option<u64>,
}

#[derive(Args, Debug)]
pub struct ConeArgs {
    /// Access URL of the cone-search service
    #[arg(short, long)]
    pub url: String,

    /// Right ascension of the search center (ICRS, degrees)
    #[arg(long)]
    pub ra: f64,

    /// Declination of the search center (ICRS, degrees)
    #[arg(long, allow_negative_numbers = true)]
    pub dec: f64,

    /// Search radius (degrees)
    #[arg(long)]
    pub radius: f64,

    /// Verbosity of the returned columns (1-3)
    #[arg(long)]
    pub verbosity: Option<u8>,

    /// Maximum number of rows to request
    #[arg(short, long)]
    pub maxrec: Option<u64>,
}

#[derive(Args, Debug)]
pub struct SiaArgs {
    /// Access URL of the image service
    #[arg(short, long)]
    pub url: String,

    /// Right ascension of the region center (ICRS, degrees)
    #[arg(long)]
    pub ra: f64,

    /// Declination of the region center (ICRS, degrees)
    #[arg(long, allow_negative_numbers = true)]
    pub dec: f64,

    /// Angular width of the region (degrees)
    #[arg(long)]
    pub size: f64,

    /// Angular height of the region, when different from the width
    #[arg(long)]
    pub height: Option<f64>,

    /// MIME filter, e.g. image/fits, ALL, GRAPHIC
    #[arg(long)]
    pub format: Option<String>,

    /// Region matching mode: covers, enclosed, center or overlaps
    #[arg(long)]
    pub intersect: Option<String>,

    /// Maximum number of rows to request
    #[arg(short, long)]
    pub maxrec: Option<u64>,
}

#[derive(Args, Debug)]
pub struct SsaArgs {
    /// Access URL of the spectrum service
    #[arg(short, long)]
    pub url: String,

    /// Right ascension of the search center (ICRS, degrees)
    #[arg(long)]
    pub ra: f64,

    /// Declination of the search center (ICRS, degrees)
    #[arg(long, allow_negative_numbers = true)]
    pub dec: f64,

    /// Search diameter (degrees)
    #[arg(long)]
    pub diameter: f64,

    /// Lower bound of the spectral band (meters)
    #[arg(long)]
    pub band_min: Option<f64>,

    /// Upper bound of the spectral band (meters)
    #[arg(long)]
    pub band_max: Option<f64>,

    /// Time coverage as an ISO 8601 range, e.g. 1998-05-21/1999
    #[arg(long)]
    pub time: Option<String>,

    /// MIME filter, e.g. application/fits
    #[arg(long)]
    pub format: Option<String>,

    /// Maximum number of rows to request
    #[arg(short, long)]
    pub maxrec: Option<u64>,
}

#[derive(Args, Debug)]
pub struct LinesArgs {
    /// Access URL of the line catalog service
    #[arg(short, long)]
    pub url: String,

    /// Lower wavelength bound (meters)
    #[arg(long)]
    pub min_wavelength: Option<f64>,

    /// Upper wavelength bound (meters)
    #[arg(long)]
    pub max_wavelength: Option<f64>,

    /// Maximum number of rows to request
    #[arg(short, long)]
    pub maxrec: Option<u64>,
}

#[derive(Args, Debug)]
pub struct ServiceArgs {
    /// Base URL of the service
    #[arg(short, long)]
    pub url: String,
}

#[derive(Args, Debug)]
pub struct DatalinkArgs {
    /// Access URL of the links endpoint
    #[arg(short, long)]
    pub url: String,

    /// Dataset identifier to look up, e.g. ivo://archive/obs/123
    #[arg(short, long)]
    pub id: String,
}

#[derive(Args, Debug)]
pub struct DownloadArgs {
    /// Access URL of the dataset
    #[arg(short, long)]
    pub url: String,

    /// Target file or directory
    #[arg(short, long, default_value = ".")]
    pub out: PathBuf,
}

/// CLI application
pub struct App {
    client: Client,
    default_maxrec: Option<u64>,
}

impl App {
    /// Create a new CLI application
    pub fn new() -> Result<Self> {
        // Load environment variables
        dotenv::dotenv().ok();

        let timeout_secs = env::var("VODAL_TIMEOUT_SECS")
            .ok()
            .and_then(|raw| raw.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let user_agent = env::var("VODAL_USER_AGENT")
            .unwrap_or_else(|_| format!("vodal/{}", env!("CARGO_PKG_VERSION")));

        let default_maxrec = env::var("VODAL_MAXREC")
            .ok()
            .and_then(|raw| raw.parse::<u64>().ok());

        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            client,
            default_maxrec,
        })
    }

    /// Run the CLI application
    pub async fn run(&self, cli: Cli) -> Result<()> {
        match cli.command {
            Commands::Tap(args) => {
                self.run_tap(args, cli.json).await?;
            },
            Commands::Cone(args) => {
                self.run_cone(args, cli.json).await?;
            },
            Commands::Sia(args) => {
                self.run_sia(args, cli.json).await?;
            },
            Commands::Ssa(args) => {
                self.run_ssa(args, cli.json).await?;
            },
            Commands::Lines(args) => {
                self.run_lines(args, cli.json).await?;
            },
            Commands::Capabilities(args) => {
                self.run_capabilities(&args.url, cli.json).await?;
            },
            Commands::Availability(args) => {
                self.run_availability(&args.url, cli.json).await?;
            },
            Commands::Datalink(args) => {
                self.run_datalink(args).await?;
            },
            Commands::Download(args) => {
                self.run_download(args).await?;
            },
        }

        Ok(())
    }

    /// Run an ADQL query, synchronously or through a UWS job
    async fn run_tap(&self, args: TapArgs, json: bool) -> Result<()> {
        let service = TapService::with_client(&args.url, self.client.clone());
        let maxrec = args.maxrec.or(self.default_maxrec);

        let results = if args.async_mode {
            self.run_tap_async(&service, &args.query, maxrec).await?
        } else {
            service.run_sync_with(&args.query, maxrec).await?
        };

        self.print_results(&results, json)
    }

    /// Submit a job, start it, poll it with a spinner and fetch the result
    async fn run_tap_async(
        &self,
        service: &TapService,
        query: &str,
        maxrec: Option<u64>,
    ) -> Result<DalResults> {
        let mut job = service.submit_with(query, maxrec).await?;
        println!("Submitted job {} at {}", job.job_id().cyan(), job.job_url());
        job.run().await?;

        let bar = ProgressBar::new_spinner();
        bar.set_style(ProgressStyle::with_template("{spinner} job {msg}")?);
        bar.enable_steady_tick(Duration::from_millis(120));

        let phase = loop {
            let phase = job.current_phase().await?;
            bar.set_message(format!("{}: {}", job.job_id(), phase));
            if phase.is_terminal() {
                break phase;
            }
            tokio::time::sleep(Duration::from_secs(2)).await;
        };
        bar.finish_and_clear();
        println!("Job finished in phase {}", phase.to_string().cyan());

        // fetch_result surfaces the job's error summary when the phase is
        // ERROR, so no explicit phase check is needed here.
        let results = job.fetch_result().await?;

        // The result is in hand; tidy up the server-side resource.
        if let Err(e) = job.delete().await {
            warn!("Failed to delete job after fetching results: {}", e);
        }
        Ok(results)
    }

    async fn run_cone(&self, args: ConeArgs, json: bool) -> Result<()> {
        let service = ConeSearchService::with_client(&args.url, self.client.clone());
        let results = service
            .search_with(
                args.ra,
                args.dec,
                args.radius,
                args.verbosity,
                args.maxrec.or(self.default_maxrec),
            )
            .await?;
        self.print_results(&results, json)
    }

    async fn run_sia(&self, args: SiaArgs, json: bool) -> Result<()> {
        let mut query = SiaQuery::new(args.ra, args.dec, args.size);
        query.size = (args.size, args.height);
        query.format = args.format;
        query.intersect = args.intersect.as_deref().map(parse_intersect).transpose()?;
        query.maxrec = args.maxrec.or(self.default_maxrec);

        let service = SiaService::with_client(&args.url, self.client.clone());
        let results = service.search(&query).await?;
        self.print_results(results.as_results(), json)
    }

    async fn run_ssa(&self, args: SsaArgs, json: bool) -> Result<()> {
        let mut query = SsaQuery::new(args.ra, args.dec, args.diameter);
        if args.band_min.is_some() || args.band_max.is_some() {
            query.band = Some((args.band_min, args.band_max));
        }
        query.time = args.time;
        query.format = args.format;
        query.maxrec = args.maxrec.or(self.default_maxrec);

        let service = SsaService::with_client(&args.url, self.client.clone());
        let results = service.search(&query).await?;
        self.print_results(results.as_results(), json)
    }

    async fn run_lines(&self, args: LinesArgs, json: bool) -> Result<()> {
        if args.min_wavelength.is_none() && args.max_wavelength.is_none() {
            return Err(Error::Cli(
                "at least one of --min-wavelength and --max-wavelength is required".to_string(),
            ));
        }
        let service = SlaService::with_client(&args.url, self.client.clone());
        let results = service
            .search_with(
                args.min_wavelength,
                args.max_wavelength,
                args.maxrec.or(self.default_maxrec),
            )
            .await?;
        self.print_results(&results, json)
    }

    async fn run_capabilities(&self, url: &str, json: bool) -> Result<()> {
        let capabilities = vosi::capabilities(&self.client, url).await?;

        if json {
            println!("{}", serde_json::to_string_pretty(&capabilities)?);
            return Ok(());
        }

        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(vec!["standardID", "version", "use", "accessURL"]);
        for capability in capabilities.iter() {
            for interface in &capability.interfaces {
                table.add_row(vec![
                    capability.standard_id.clone().unwrap_or_default(),
                    interface.version.clone().unwrap_or_default(),
                    interface.use_role.clone().unwrap_or_default(),
                    interface.access_url.clone(),
                ]);
            }
        }
        println!("{}", table);
        println!("{} capabilities", capabilities.len());
        Ok(())
    }

    async fn run_availability(&self, url: &str, json: bool) -> Result<()> {
        let availability = vosi::availability(&self.client, url).await?;

        if json {
            println!("{}", serde_json::to_string_pretty(&availability)?);
            return Ok(());
        }

        if availability.available {
            println!("{}", "Service is available".green());
        } else {
            println!("{}", "Service is NOT available".red().bold());
        }
        if let Some(up_since) = availability.up_since {
            println!("Up since: {}", up_since);
        }
        if let Some(down_at) = availability.down_at {
            println!("Scheduled downtime at: {}", down_at);
        }
        if let Some(back_at) = availability.back_at {
            println!("Expected back at: {}", back_at);
        }
        for note in &availability.notes {
            println!("Note: {}", note);
        }
        Ok(())
    }

    async fn run_datalink(&self, args: DatalinkArgs) -> Result<()> {
        let service = DatalinkService::with_client(&args.url, self.client.clone());
        let links = service.links(&args.id).await?;

        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(vec!["semantics", "content type", "length", "link"]);
        for record in links.records() {
            let target = if record.is_error() {
                record.error_message().unwrap_or_default().red().to_string()
            } else if let Some(url) = record.access_url() {
                url.to_string()
            } else {
                // Rows served through a descriptor have no direct URL.
                format!("service: {}", record.service_def().unwrap_or("?"))
            };
            table.add_row(vec![
                record.semantics().unwrap_or_default().to_string(),
                record.content_type().unwrap_or_default().to_string(),
                record
                    .content_length()
                    .map(|l| l.to_string())
                    .unwrap_or_default(),
                target,
            ]);
        }
        println!("{}", table);
        println!("{} links for {}", links.len(), args.id);

        if links.soda_service().is_some() {
            println!("{}", "A SODA cutout service is available for this dataset".cyan());
        }
        Ok(())
    }

    async fn run_download(&self, args: DownloadArgs) -> Result<()> {
        let path = download::fetch_to_file(&self.client, &args.url, &args.out, true).await?;
        println!("{} {}", "Saved to".green(), path.display());
        Ok(())
    }

    /// Print a result table, truncated for the terminal, or as JSON
    fn print_results(&self, results: &DalResults, json: bool) -> Result<()> {
        info!("Rendering {} result rows", results.len());

        if json {
            let value = serde_json::json!({
                "fields": results.fieldnames(),
                "overflowed": results.overflowed(),
                "rows": results.records().map(|r| r.to_json()).collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
            return Ok(());
        }

        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(results.fieldnames());
        for record in results.records().take(MAX_DISPLAY_ROWS) {
            table.add_row(record.values().iter().map(|v| v.to_string()));
        }
        println!("{}", table);

        if results.len() > MAX_DISPLAY_ROWS {
            println!(
                "... and {} more rows (showing first {} only)",
                results.len() - MAX_DISPLAY_ROWS,
                MAX_DISPLAY_ROWS
            );
        }
        println!("{}", format!("{} rows", results.len()).cyan());
        if results.overflowed() {
            println!(
                "{}",
                "Result was truncated at the MAXREC limit".yellow()
            );
        }
        Ok(())
    }
}

/// Maps the CLI spelling onto the SIA matching mode.
fn parse_intersect(raw: &str) -> Result<Intersect> {
    match raw.to_ascii_lowercase().as_str() {
        "covers" => Ok(Intersect::Covers),
        "enclosed" => Ok(Intersect::Enclosed),
        "center" => Ok(Intersect::Center),
        "overlaps" => Ok(Intersect::Overlaps),
        other => Err(Error::Cli(format!(
            "invalid intersect mode `{}`; expected covers, enclosed, center or overlaps",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn tap_arguments_parse() {
        let cli = Cli::try_parse_from([
            "vodal",
            "tap",
            "--url",
            "http://archive/tap",
            "--query",
            "SELECT TOP 5 * FROM t",
            "--async-mode",
            "--maxrec",
            "100",
        ])
        .unwrap();
        match cli.command {
            Commands::Tap(args) => {
                assert_eq!(args.url, "http://archive/tap");
                assert!(args.async_mode);
                assert_eq!(args.maxrec, Some(100));
            },
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn cone_arguments_parse() {
        let cli = Cli::try_parse_from([
            "vodal", "cone", "--url", "http://scs", "--ra", "180.0", "--dec", "-0.5", "--radius",
            "0.25",
        ])
        .unwrap();
        match cli.command {
            Commands::Cone(args) => {
                assert_eq!(args.ra, 180.0);
                assert_eq!(args.dec, -0.5);
                assert_eq!(args.radius, 0.25);
                assert_eq!(args.verbosity, None);
            },
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn json_flag_is_global() {
        let cli = Cli::try_parse_from([
            "vodal", "cone", "--url", "http://scs", "--ra", "1", "--dec", "2", "--radius", "0.1",
            "--json",
        ])
        .unwrap();
        assert!(cli.json);
    }

    #[test]
    fn missing_required_argument_is_rejected() {
        assert!(Cli::try_parse_from(["vodal", "cone", "--url", "http://scs"]).is_err());
    }

    #[test]
    fn intersect_spellings() {
        assert_eq!(parse_intersect("overlaps").unwrap(), Intersect::Overlaps);
        assert_eq!(parse_intersect("COVERS").unwrap(), Intersect::Covers);
        assert!(parse_intersect("touching").is_err());
    }
}
