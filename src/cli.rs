use clap::Parser;

use crate::config::AppConfig;

#[derive(Parser, Debug)]
#[command(name = "contactfinder")]
#[command(about = "Crawls company websites and extracts validated contact phone numbers")]
#[command(version)]
pub struct Args {
    /// Create default configuration file at ./config/contactfinder.toml
    #[arg(long)]
    pub init: bool,

    /// Input CSV file (overrides the configured input path)
    #[arg(short, long)]
    pub input: Option<String>,

    /// Output base directory (overrides the configured one)
    #[arg(long)]
    pub output_dir: Option<String>,

    /// Row range to process: "a-b", "a-", "-b", or "a"
    #[arg(long)]
    pub row_range: Option<String>,

    /// Verbose logging (use -v for detail, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Export execution logs to a file (specify file path)
    #[arg(long)]
    pub log_file: Option<String>,

    /// Disable colored console output
    #[arg(long)]
    pub no_color: bool,

    /// Ignore robots.txt for this run (overrides config)
    #[arg(long)]
    pub disable_robots: bool,

    /// Disable DNS-error seed fallbacks for this run (overrides config)
    #[arg(long)]
    pub disable_dns_fallbacks: bool,

    /// Concurrent domain workers (overrides config)
    #[arg(short = 'j', long)]
    pub parallel_jobs: Option<usize>,
}

impl Args {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(jobs) = self.parallel_jobs {
            if jobs == 0 {
                return Err("Parallel jobs must be greater than 0".to_string());
            }
            if jobs > 64 {
                return Err("Parallel jobs cannot exceed 64".to_string());
            }
        }
        if let Some(range) = &self.row_range {
            crate::config::RowRange::parse(range).map_err(|e| e.to_string())?;
        }
        Ok(())
    }

    /// Fold CLI overrides into the loaded configuration.
    pub fn apply_to(&self, config: &mut AppConfig) {
        if let Some(input) = &self.input {
            config.input.file_path = input.clone();
        }
        if let Some(dir) = &self.output_dir {
            config.output.base_dir = dir.clone();
        }
        if let Some(range) = &self.row_range {
            config.input.row_range = range.clone();
        }
        if self.disable_robots {
            config.scraper.respect_robots_txt = false;
        }
        if self.disable_dns_fallbacks {
            config.scraper.enable_dns_error_fallbacks = false;
        }
        if let Some(jobs) = self.parallel_jobs {
            config.scraper.max_concurrent_domains = jobs;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_apply() {
        let args = Args {
            init: false,
            input: Some("companies.csv".to_string()),
            output_dir: Some("/tmp/out".to_string()),
            row_range: Some("2-5".to_string()),
            verbose: 0,
            log_file: None,
            no_color: false,
            disable_robots: true,
            disable_dns_fallbacks: true,
            parallel_jobs: Some(8),
        };
        assert!(args.validate().is_ok());

        let mut config = AppConfig::default();
        args.apply_to(&mut config);
        assert_eq!(config.input.file_path, "companies.csv");
        assert_eq!(config.output.base_dir, "/tmp/out");
        assert_eq!(config.input.row_range, "2-5");
        assert!(!config.scraper.respect_robots_txt);
        assert!(!config.scraper.enable_dns_error_fallbacks);
        assert_eq!(config.scraper.max_concurrent_domains, 8);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut args = Args {
            init: false,
            input: None,
            output_dir: None,
            row_range: Some("9-2".to_string()),
            verbose: 0,
            log_file: None,
            no_color: false,
            disable_robots: false,
            disable_dns_fallbacks: false,
            parallel_jobs: None,
        };
        assert!(args.validate().is_err());
        args.row_range = None;
        args.parallel_jobs = Some(0);
        assert!(args.validate().is_err());
    }
}
