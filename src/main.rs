use std::{error::Error, net::IpAddr, time::Duration};

use clap::{Parser, Subcommand};
use log::info;
use squadcon::{
    client::Client,
    commands::AdminCommand,
    config::{ClientConfig, ConnectionInfo, LineEnding},
    players::{PlayerStatus, ACTIVE_HEADER, DISCONNECTED_HEADER},
    server::Server,
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    signal,
};

/// Remote admin console for Squad servers.
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: IpAddr,
    /// Rcon port
    #[clap(short, long, default_value = "21114")]
    port: u16,
    /// Query port, only used for server status lookups
    #[clap(short, long, default_value = "27165")]
    query_port: u16,
    /// Rcon password
    #[clap(long, env = "SQUADCON_PASSWORD", hide_env_values = true)]
    password: String,
    /// Connect and command timeout in milliseconds
    #[clap(short, long, default_value = "5000")]
    timeout_ms: u64,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[clap(flatten)]
    Remote(Remote),
    /// Run a local test server that accepts `--password`
    Serve,
}

/// Subcommands that talk to a server.
#[derive(Subcommand, Debug)]
enum Remote {
    /// Run one command and print the response
    Exec { command: Vec<String> },
    /// List connected and recently disconnected players
    Players,
    /// Read commands from stdin until EOF or `quit`
    Shell,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let info = ConnectionInfo::new(args.host, args.port, args.query_port, args.password.as_str());
    let timeout = Duration::from_millis(args.timeout_ms);

    let command = match args.command {
        Command::Serve => return serve(info).await,
        Command::Remote(command) => command,
    };

    let client = Client::new(
        ClientConfig::default()
            .with_connect_timeout(timeout)
            .with_command_timeout(timeout)
            .with_line_ending(LineEnding::Preserve),
    );
    client.connect(info).await?;

    match command {
        Remote::Exec { command } => {
            let command = AdminCommand::Raw(command.join(" "));
            println!("{}", client.execute(&command).await?);
        }
        Remote::Players => {
            for player in client.list_players().await? {
                let status = match player.status {
                    PlayerStatus::Connected => "connected".to_string(),
                    PlayerStatus::Disconnected => format!(
                        "left {} ago",
                        player.disconnected_for.as_deref().unwrap_or("?")
                    ),
                };
                println!("{:>3}  {}  {}  ({})", player.slot, player.steam_id, player.name, status);
            }
        }
        Remote::Shell => shell(&client).await?,
    }

    client.disconnect().await;
    Ok(())
}

async fn shell(client: &Client) -> Result<(), Box<dyn Error>> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line {
            "" => continue,
            "quit" | "exit" => break,
            _ => match client.send_command(line).await {
                Ok(response) => println!("{}", response),
                Err(err) => eprintln!("error: {}", err),
            },
        }
        if !client.is_connected() {
            eprintln!("connection lost");
            break;
        }
    }
    Ok(())
}

async fn serve(info: ConnectionInfo) -> Result<(), Box<dyn Error>> {
    let server = Server::bind(info.rcon_addr(), &info.password, |command| match command {
        "ListPlayers" => format!(
            "{}\nID: 0 | SteamID: 76561198000000001 | Name: Alice\n\
             {}\nID: 1 | SteamID: 76561198000000002 | Since: 00:05:12 | Name: Bob\n",
            ACTIVE_HEADER, DISCONNECTED_HEADER
        ),
        other => format!("Executed: {}", other),
    })
    .await?;

    let handle = server.start();
    tokio::select!(
        _ = handle => {}
        _ = signal::ctrl_c() => {}
    );

    info!("bye");
    Ok(())
}
