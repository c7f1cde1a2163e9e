use clap::{ArgAction, Parser};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "apihealth",
    version,
    about = "API endpoint discovery and health-check engine",
    long_about = "apihealth discovers the API endpoints a domain exposes (manual list, sitemap.xml, homepage links, then common API paths) and health-checks each one, reporting status, latency and pass/fail.\n\nExamples:\n  apihealth -d example.com\n  apihealth -d https://api.example.com -e /v1/health,/v1/users\n  apihealth -d example.com --discover-only\n  apihealth -d example.com -o results.json --save-dir ~/.apihealth/runs\n\nTip: Use --init-config once, then keep HTTP settings in ~/.apihealth/config.yml."
)]
pub struct CliArgs {
    #[arg(
        short = 'v',
        long = "vb",
        visible_alias = "verbose",
        action = ArgAction::Count,
        help_heading = "Output",
        help = "Increase log verbosity (-v info, -vv debug). RUST_LOG overrides."
    )]
    pub verbose: u8,

    #[arg(
        short = 'c',
        long = "clr",
        visible_alias = "color",
        help_heading = "Output",
        help = "Enable colored output (overrides --no-color)."
    )]
    pub color: bool,

    #[arg(
        short = 'n',
        long = "nc",
        visible_alias = "no-color",
        help_heading = "Output",
        help = "Disable colored output."
    )]
    pub no_color: bool,

    #[arg(
        short = 'd',
        long = "dm",
        visible_alias = "domain",
        value_name = "DOMAIN",
        help_heading = "Input",
        help = "Target domain, bare (example.com) or with scheme (https://example.com/base)."
    )]
    pub domain: Option<String>,

    #[arg(
        short = 'e',
        long = "ep",
        visible_alias = "endpoints",
        value_name = "LIST",
        action = ArgAction::Append,
        help_heading = "Input",
        help = "Comma-separated endpoints to test instead of discovering them (repeatable)."
    )]
    pub endpoints: Vec<String>,

    #[arg(
        short = 'C',
        long = "cfg",
        visible_alias = "config",
        value_name = "FILE",
        help_heading = "Input",
        help = "Path to config file (defaults to ~/.apihealth/config.yml)."
    )]
    pub config: Option<String>,

    #[arg(
        long = "ic",
        visible_alias = "init-config",
        help_heading = "Input",
        help = "Write a commented default config file and exit."
    )]
    pub init_config: bool,

    #[arg(
        short = 'D',
        long = "do",
        visible_alias = "discover-only",
        help_heading = "Scan",
        help = "Run discovery only and print the candidate endpoints."
    )]
    pub discover_only: bool,

    #[arg(
        short = 'x',
        long = "xs",
        visible_alias = "expect",
        value_name = "CODES",
        help_heading = "Scan",
        help = "Extra status codes that count as a pass on top of 2xx (comma-separated)."
    )]
    pub expect: Option<String>,

    #[arg(
        short = 't',
        long = "cnc",
        visible_alias = "concurrency",
        value_name = "N",
        help_heading = "Performance",
        help = "Max in-flight requests during the test phase."
    )]
    pub concurrency: Option<usize>,

    #[arg(
        short = 'r',
        long = "rt",
        visible_alias = "rate",
        value_name = "RPS",
        help_heading = "Performance",
        help = "Request rate limit for the test phase (requests per second, 0 = unlimited)."
    )]
    pub rate: Option<u32>,

    #[arg(
        short = 'w',
        long = "wrk",
        visible_alias = "workers",
        value_name = "N",
        help_heading = "Performance",
        help = "Number of runtime worker threads."
    )]
    pub workers: Option<usize>,

    #[arg(
        short = 'T',
        long = "to",
        visible_alias = "timeout",
        value_name = "MILLIS",
        help_heading = "HTTP",
        help = "Per-request timeout for the test phase in milliseconds."
    )]
    pub timeout: Option<u64>,

    #[arg(
        short = 'p',
        long = "px",
        visible_alias = "proxy",
        value_name = "URL",
        help_heading = "HTTP",
        help = "HTTP proxy URL (e.g. http://127.0.0.1:8080)."
    )]
    pub proxy: Option<String>,

    #[arg(
        short = 'H',
        long = "hdr",
        visible_alias = "header",
        value_name = "HEADER",
        help_heading = "HTTP",
        help = "Add a header to all requests (format: 'Key: Value')."
    )]
    pub header: Option<String>,

    #[arg(
        short = 'U',
        long = "ua",
        visible_alias = "user-agent",
        value_name = "UA",
        help_heading = "HTTP",
        help = "Override the User-Agent header."
    )]
    pub user_agent: Option<String>,

    #[arg(
        short = 'F',
        long = "frd",
        visible_alias = "follow-redirects",
        value_name = "BOOL",
        num_args = 0..=1,
        default_missing_value = "true",
        help_heading = "HTTP",
        help = "Follow HTTP redirects (default true; pass false to disable)."
    )]
    pub follow_redirects: Option<bool>,

    #[arg(
        short = 'k',
        long = "ins",
        visible_alias = "insecure",
        help_heading = "HTTP",
        help = "Accept invalid TLS certificates and hostnames."
    )]
    pub insecure: bool,

    #[arg(
        short = 'o',
        long = "out",
        visible_alias = "output",
        value_name = "FILE",
        help_heading = "Output",
        help = "Write results to a file."
    )]
    pub output: Option<String>,

    #[arg(
        short = 'A',
        long = "of",
        visible_alias = "output-format",
        value_name = "FORMAT",
        help_heading = "Output",
        help = "Output format (text or json). Inferred from the file extension when omitted."
    )]
    pub output_format: Option<String>,

    #[arg(
        short = 'E',
        long = "exp",
        visible_alias = "export",
        help_heading = "Output",
        help = "Export JSON results to api-test-results-<domain>-<millis>.json in the current directory."
    )]
    pub export: bool,

    #[arg(
        short = 's',
        long = "sd",
        visible_alias = "save-dir",
        value_name = "DIR",
        help_heading = "Output",
        help = "Save each run summary under DIR/api/."
    )]
    pub save_dir: Option<String>,
}
