mod cli;

use anyhow::{anyhow, Context};
use yalidine_client::{cache_key, CacheStoreExt, RequestContext, Session, SessionOptions};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let matches = cli::build_cli().get_matches();
    let debug = matches.get_flag("debug");
    cli::init_logging(matches.get_one::<String>("log-level").map(String::as_str), debug);

    let mut options = SessionOptions::from_env()?;
    if let Some(agent) = matches.get_one::<String>("agent") {
        options.agent = agent.clone();
    }
    options.debug |= debug;
    let session = Session::new(options)?;

    let result = match matches.subcommand() {
        Some(("ping", _)) => {
            if session.test_connection().await {
                println!("ok");
                Ok(())
            } else {
                println!("unreachable");
                Err(anyhow!("{} API unreachable", session.agent()))
            }
        }
        Some(("quota", _)) => {
            let reachable = session.test_connection().await;
            log::debug!("connection reachable={}", reachable);
            println!("{}", serde_json::to_string_pretty(&session.quota_status())?);
            Ok(())
        }
        Some(("get", sub)) => {
            let endpoint = sub
                .get_one::<String>("endpoint")
                .context("endpoint is required")?;
            let mut ctx = RequestContext::get(endpoint.as_str());
            for raw in sub.get_many::<String>("query").into_iter().flatten() {
                let (k, v) = cli::parse_query_pair(raw)
                    .ok_or_else(|| anyhow!("query must be key=value, got `{}`", raw))?;
                ctx = ctx.query(k, v);
            }
            let resp = session.execute(ctx).await?;
            println!("{}", serde_json::to_string_pretty(&resp.data)?);
            Ok(())
        }
        Some(("init", _)) => {
            session.init().await?;
            let key = cache_key(session.agent().as_str(), "wilayas");
            let cached: Option<serde_json::Value> = session.database().get(&key).await?;
            let count = match cached {
                Some(serde_json::Value::Array(items)) => items.len(),
                Some(serde_json::Value::Object(o)) => o
                    .get("data")
                    .and_then(|d| d.as_array())
                    .map(|a| a.len())
                    .unwrap_or(1),
                Some(_) => 1,
                None => 0,
            };
            println!("{}", count);
            Ok(())
        }
        _ => Err(anyhow!("unknown command")),
    };

    session.destroy().await;
    result
}
