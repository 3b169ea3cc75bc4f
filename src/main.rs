use std::env;
use std::path::Path;

use anyhow::Context;
use axum::{Router, routing::get};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use game_sales_api::{api, db};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "game_sales_api=info,tower_http=info".into()),
        )
        .init();

    let db_path = env::var("GAMES_DB").unwrap_or_else(|_| "games.db".to_string());
    let static_dir = env::var("STATIC_DIR").unwrap_or_else(|_| "static".to_string());
    let port: u16 = env::var("PORT")
        .unwrap_or_else(|_| "3000".to_string())
        .parse()
        .context("PORT must be a valid number")?;

    let db = db::open(Path::new(&db_path))?;

    // Unmatched paths fall through to the static directory.
    let app = Router::new()
        .route("/games/", get(api::get_games))
        .route("/games/stats", get(api::get_game_stats))
        .route("/games/stats/by-year", get(api::get_stats_by_year))
        .route("/games/top-sellers", get(api::get_top_sellers))
        .route("/games/console/{console_name}", get(api::get_games_by_console))
        .route("/games/consoles", get(api::get_unique_consoles))
        .route("/games/genres", get(api::get_unique_genres))
        .fallback_service(ServeDir::new(&static_dir))
        .layer(TraceLayer::new_for_http())
        .with_state(db);

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("serving games API on {addr} (db: {db_path}, static: {static_dir})");
    axum::serve(listener, app).await?;
    Ok(())
}
