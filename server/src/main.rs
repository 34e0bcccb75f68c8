use actix_web::{web, App, HttpServer};

use server::connection::ws_index;
use server::server::spawn_server;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init();

    let srv_tx = spawn_server();

    let port = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(8080);

    HttpServer::new(move || {
        App::new()
            .data(srv_tx.clone())
            .route("/ws", web::get().to(ws_index))
    })
    .bind(("127.0.0.1", port))?
    .run()
    .await
}
