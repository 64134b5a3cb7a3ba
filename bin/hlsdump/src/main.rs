mod handler;

use std::{num::NonZeroU32, path::PathBuf, str::FromStr, sync::Arc, time::Duration};

use clap::Parser;
use fake_user_agent::get_chrome_rua;
use hlsq::{filter, DirCapture, HttpClient, RetryPolicy, Session, Variant};
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    ClientBuilder, Url,
};

use handler::FsHandler;

#[derive(Parser, Debug, Clone)]
#[clap(version, about)]
pub struct HlsdumpArgs {
    /// Debug output
    #[clap(long, alias = "debug")]
    verbose: bool,

    /// Maximum number of simultaneous segment downloads
    #[clap(long, default_value = "8", env = "HLSDUMP_THREADS")]
    threads: NonZeroU32,

    /// Attempts per request, including the first one
    #[clap(long, default_value = "5", env = "HLSDUMP_RETRIES")]
    retries: u32,

    /// Record every variant instead of the one with the highest bandwidth
    #[clap(long)]
    all_variants: bool,

    /// Keep every fetched playlist under <OUTPUT>/debug
    #[clap(long)]
    debug_capture: bool,

    /// Cookies used to download
    #[clap(long)]
    cookies: Option<String>,

    /// HTTP Header used to download
    ///
    /// Custom header. eg. "User-Agent: xxxxx".
    #[clap(short = 'H', long)]
    headers: Vec<String>,

    /// Master or media playlist URL
    url: Url,

    /// Output directory
    output: PathBuf,
}

impl HlsdumpArgs {
    fn client(&self) -> anyhow::Result<HttpClient> {
        let mut headers = HeaderMap::new();
        for header in &self.headers {
            let (key, value) = header
                .split_once(':')
                .ok_or_else(|| anyhow::anyhow!("Invalid header: {header}"))?;
            headers.insert(
                HeaderName::from_str(key.trim())?,
                HeaderValue::from_str(value.trim())?,
            );
        }

        let client = HttpClient::new(
            ClientBuilder::new()
                .default_headers(headers)
                .user_agent(get_chrome_rua())
                .connect_timeout(Duration::from_secs(10)),
        )?;

        if let Some(cookies) = &self.cookies {
            let cookies = cookies
                .split(';')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect();
            client.add_cookies(cookies, self.url.clone())?;
        }

        Ok(client)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = HlsdumpArgs::parse();
    pretty_env_logger::formatted_builder()
        .filter_level(if args.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .init();

    let client = args.client()?;
    let retry = RetryPolicy::new(args.retries);
    let handler = Arc::new(
        FsHandler::new(client.clone(), &args.output, args.threads, retry.clone()).await?,
    );

    let mut builder = Session::builder().client(client).retry(retry);
    if args.debug_capture {
        builder = builder.capture(DirCapture::new(args.output.join("debug"))?);
    }

    let variant_filter: fn(Vec<Variant>) -> Vec<Variant> = if args.all_variants {
        filter::all
    } else {
        filter::max_bandwidth
    };
    let session = builder
        .play(args.url.clone(), variant_filter, handler.clone())
        .await?;

    // ctrl-c handler
    let token = session.cancellation_token();
    let ctrlc_handler = tokio::spawn(async move {
        // the first ctrl-c stops the session
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Ctrl-C received, stopping session.");
            token.cancel();
        }

        // the second one forces exit
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Ctrl-C received again, force exit.");
            std::process::exit(1);
        }
    });

    let result = session.wait().await;
    ctrlc_handler.abort();

    handler.finish().await?;
    if let Err(e) = result {
        log::error!("Recording {} failed: {e}", args.url);
        return Err(e.into());
    }

    log::info!("Recorded {} into {}", args.url, args.output.display());
    Ok(())
}
