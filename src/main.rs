//! sat-declaration: files the SAT provisional declaration through the portal wizard.

#[tokio::main]
async fn main() {
    let code = sat_declaration::cli::run().await;
    std::process::exit(code);
}
