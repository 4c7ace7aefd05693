use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{anyhow, bail, Context, Result};
use cake_spa::{Document, DomEvent, ReqwestTransport, SpaConfig, SpaRuntime};
use serde_json::json;
use tokio::task::LocalSet;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

const USAGE: &str = "usage: cake-spa <url> [--config <path>] [--debug] \
[--click <selector>] [--key <key>] [--nav <href>]...";

/// A scripted interaction replayed against the loaded page.
#[derive(Debug)]
enum Interaction {
    Click(String),
    Key(String),
    Navigate(String),
}

#[derive(Debug)]
struct Options {
    url: Url,
    config_path: Option<PathBuf>,
    debug: bool,
    interactions: Vec<Interaction>,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Options> {
    let mut url = None;
    let mut config_path = std::env::var("CAKE_SPA_CONFIG").ok().map(PathBuf::from);
    let mut debug = false;
    let mut interactions = Vec::new();

    while let Some(arg) = args.next() {
        let mut value = |flag: &str| args.next().ok_or_else(|| anyhow!("{flag} needs a value\n{USAGE}"));
        match arg.as_str() {
            "--config" => config_path = Some(PathBuf::from(value("--config")?)),
            "--debug" => debug = true,
            "--click" => interactions.push(Interaction::Click(value("--click")?)),
            "--key" => interactions.push(Interaction::Key(value("--key")?)),
            "--nav" => interactions.push(Interaction::Navigate(value("--nav")?)),
            flag if flag.starts_with("--") => bail!("unknown option {flag}\n{USAGE}"),
            _ if url.is_none() => {
                url = Some(Url::parse(&arg).with_context(|| format!("invalid page URL {arg}"))?)
            }
            _ => bail!("unexpected argument {arg}\n{USAGE}"),
        }
    }

    Ok(Options {
        url: url.ok_or_else(|| anyhow!(USAGE))?,
        config_path,
        debug,
        interactions,
    })
}

fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .try_init();

    let options = parse_args(std::env::args().skip(1))?;

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    let local = LocalSet::new();
    let html = local.block_on(&rt, run(options))?;
    println!("{html}");
    Ok(())
}

async fn run(options: Options) -> Result<String> {
    let client = reqwest::Client::new();
    let page = client
        .get(options.url.clone())
        .send()
        .await
        .and_then(|response| response.error_for_status())
        .with_context(|| format!("failed to load {}", options.url))?
        .text()
        .await
        .context("failed to read page body")?;
    let document = Document::parse(&page);

    let mut config = SpaConfig::load(options.config_path).context("failed to load configuration")?;
    if let Some(inline) = SpaConfig::inline_overrides(&document) {
        config = config.merged(&inline);
    }
    if options.debug {
        config = config.merged(&json!({ "debug": true }));
    }

    let transport = Rc::new(ReqwestTransport::with_client(client));
    let runtime = SpaRuntime::new(document, options.url, config, transport);
    runtime.on_any(|event| info!(target = "cake_spa", event = event.name(), detail = %event.detail(), "lifecycle event"));
    runtime.init();

    for interaction in options.interactions {
        match &interaction {
            Interaction::Click(selector) => match runtime.document().query(selector) {
                Some(element) => {
                    runtime.dispatch_event(DomEvent::click(element));
                }
                None => warn!(target = "cake_spa", %selector, "no element to click"),
            },
            Interaction::Key(key) => match runtime.document().body() {
                Some(body) => {
                    runtime.dispatch_event(DomEvent::key_down(body, key.as_str()));
                }
                None => warn!(target = "cake_spa", "document has no body"),
            },
            Interaction::Navigate(href) => {
                runtime.navigate(href).await;
            }
        }
        runtime.idle().await;

        if let Some(url) = runtime.take_location_changes().first() {
            info!(target = "cake_spa", %url, "page requested a full load; stopping");
            break;
        }
    }

    Ok(runtime.document().to_html())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> impl Iterator<Item = String> {
        list.iter().map(|arg| arg.to_string()).collect::<Vec<_>>().into_iter()
    }

    #[test]
    fn parses_interactions_in_order() {
        let options = parse_args(args(&[
            "https://shop.test/",
            "--click",
            "#add",
            "--nav",
            "/cart",
            "--key",
            "s",
        ]))
        .unwrap();
        assert_eq!(options.url.as_str(), "https://shop.test/");
        assert!(matches!(&options.interactions[0], Interaction::Click(sel) if sel == "#add"));
        assert!(matches!(&options.interactions[1], Interaction::Navigate(href) if href == "/cart"));
        assert!(matches!(&options.interactions[2], Interaction::Key(key) if key == "s"));
    }

    #[test]
    fn rejects_missing_values_and_urls() {
        assert!(parse_args(args(&["https://shop.test/", "--click"])).is_err());
        assert!(parse_args(args(&["--debug"])).is_err());
        assert!(parse_args(args(&["not a url"])).is_err());
    }
}
