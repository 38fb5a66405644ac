//! Steers the retry loop from lifecycle hooks: transport failures are
//! re-attempted twice, a 503 once.

use httpwire::{Client, Message, Request};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let client = Client::builder()
        .throw_exceptions(true)
        .on_before_request(|request| request.set_header("X-Demo", "retry"))
        .on_exception(|_, error, decision| {
            if decision.retry_count < 2 {
                eprintln!("transfer failed ({}), retrying", error);
                decision.retry();
            }
        })
        .on_error_status(503, |_, _, decision| {
            if decision.retry_count < 1 {
                decision.retry();
            }
        })
        .build();

    let request = Request::get("https://httpbin.org/status/200,503")?;
    match client.send(request).await {
        Ok(response) => println!(
            "settled: {} {}",
            response.status(),
            response.reason_phrase()
        ),
        Err(error) => eprintln!("gave up: {}", error),
    }

    Ok(())
}
