use log_follower::follow_lines;
use std::env;
use std::process;
use tokio_stream::StreamExt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();

    let (file_path, from_start) = match args.as_slice() {
        [_, path] => (path, false),
        [_, flag, path] | [_, path, flag] if flag == "--from-start" => (path, true),
        _ => {
            let program = args.first().map_or("log-follower", String::as_str);
            eprintln!("Usage: {} [--from-start] <file_path>", program);
            process::exit(1);
        }
    };

    match follow_lines(file_path, from_start).await {
        Ok(mut lines) => {
            while let Some(line_result) = lines.next().await {
                match line_result {
                    Ok(line) => println!("{}", line),
                    Err(e) => {
                        eprintln!("Error following file: {}", e);
                        process::exit(1);
                    }
                }
            }
        }
        Err(e) => {
            eprintln!("Error setting up file follower: {}", e);
            process::exit(1);
        }
    }
}
