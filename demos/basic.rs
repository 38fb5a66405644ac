//! Sends one request synchronously, then fans several out through the
//! multiplexed engine.

use httpwire::{Client, Request};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let client = Client::builder().user_agent("httpwire-demo/0.1").build();

    let response = client.send(Request::get("https://httpbin.org/get")?).await?;
    println!("sync: {} {}", response.status(), response.reason_phrase());

    for path in ["/get", "/headers", "/user-agent"] {
        let request = Request::get(&format!("https://httpbin.org{}", path))?;
        client.send_async(
            request,
            move |response| println!("async {}: {}", path, response.status()),
            move |error, _| eprintln!("async {}: {}", path, error),
        );
    }
    client.wait().await;

    Ok(())
}
