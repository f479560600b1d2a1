use costscope_server::core::CostScopeApp;

#[tokio::main]
async fn main() {
    if let Err(e) = CostScopeApp::run().await {
        eprintln!("\nError: {}\n", e);
        std::process::exit(1);
    }
}
