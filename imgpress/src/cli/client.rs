use client::CompressParams;

pub async fn compress(params: CompressParams) {
    match client::compress_file(&params).await {
        Ok(reply) => {
            println!("{}", reply.message);
            println!("{}", reply.data.download_url);
        }
        Err(e) => fail(&e),
    }
}

pub async fn stats(uri: &str) {
    match client::storage_stats(uri).await {
        Ok(stats) => println!("{}", client::stats_table(&stats)),
        Err(e) => fail(&e),
    }
}

pub async fn cleanup(uri: &str, retention_hours: Option<u64>) {
    match client::cleanup(uri, retention_hours).await {
        Ok(report) => println!("{}", client::cleanup_table(&report)),
        Err(e) => fail(&e),
    }
}

fn fail(e: &client::ClientError) -> ! {
    eprintln!("error: {e}");
    std::process::exit(1);
}
