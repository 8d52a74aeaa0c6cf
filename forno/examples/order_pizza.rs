use forno::{ProbePolicy, Reporter, Runner, client::PizzaClient, report::StdoutReporter, suite};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Point BASE_URL at a running QuickPizza instance; defaults to
    // http://localhost:3333.
    let client = PizzaClient::from_env().unwrap();

    // A quick session: one minute of smoke traffic plus the functional pass.
    // Swap in the suite::performance scenarios for the long staged session.
    let report = Runner::new()
        .probe(client.clone(), ProbePolicy::Warn)
        .scenario(suite::smoke_test(&client))
        .scenario(suite::functional_test(&client))
        .thresholds(suite::default_thresholds())
        .run()
        .await
        .unwrap();

    StdoutReporter.report(&report).await.unwrap();

    std::process::exit(report.exit_code());
}
