use std::sync::Arc;

use game_config::{DiceConfigs, Dictionaries};
use tracing_subscriber::EnvFilter;

mod app;
mod config;
mod handlers;
mod projection;
mod responses;
mod store;
mod tokens;
mod worker;

#[tokio::main]
async fn main() {
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("Failed to load dotenv file: {}", e);
    }
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Arc::new(config::AppConfig::from_env());
    let pool_url = dotenvy::var("DATABASE_URL").expect("Failed to get database url from env");
    let pool = sqlx::PgPool::connect(&pool_url)
        .await
        .expect("Failed to connect to postgres instance");
    store::pg::init(&pool)
        .await
        .expect("Failed to initialise the database schema");

    let (dispatcher, jobs) = worker::queue();
    let state = app::AppState {
        store: store::pg::PgStore(pool),
        config: config.clone(),
        minter: Arc::new(tokens::TokenMinter::new()),
        dice: Arc::new(DiceConfigs::load(&config.dice_dir)),
        dictionaries: Arc::new(Dictionaries::discover(&config.dictionary_dir)),
        dispatcher,
    };
    let _scorer = worker::spawn(
        jobs,
        state.store.clone(),
        state.dice.clone(),
        state.dictionaries.clone(),
    );

    let app = app::router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind listener");
    tracing::info!(addr = %config.bind_addr, "boggle server listening");
    axum::serve(listener, app).await.unwrap();
}
