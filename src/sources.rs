use anyhow::Result;

use crate::config::Config;
use crate::connector_render::RenderStrategy;

pub fn list_sources(config: &Config) -> Result<()> {
    println!("{:<16} {}", "LISTING", config.listing.url);
    println!("{:<16} {}", "TIMEZONE", config.crawl.timezone);
    println!("{:<16} {}", "STRATEGY A", RenderStrategy::describe(config));
    println!(
        "{:<16} {} feed{} configured",
        "STRATEGY B",
        config.feeds.len(),
        if config.feeds.len() == 1 { "" } else { "s" }
    );
    println!();

    println!("{:<32} {:<10} FEED", "DOMAIN", "INTERVAL");
    println!(
        "{:<32} {:<10} -",
        "(default)",
        format!("{}s", config.rate_limit.default_interval_secs)
    );

    let mut domains: Vec<&String> = config
        .feeds
        .keys()
        .chain(config.rate_limit.domains.keys())
        .collect();
    domains.sort();
    domains.dedup();

    for domain in domains {
        let interval = config
            .rate_limit
            .domains
            .get(domain)
            .copied()
            .unwrap_or(config.rate_limit.default_interval_secs);
        let feed = config.feeds.get(domain).map(String::as_str).unwrap_or("-");
        println!("{:<32} {:<10} {}", domain, format!("{}s", interval), feed);
    }

    Ok(())
}
