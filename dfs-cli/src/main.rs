// Copyright 2023 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! The interactive client shell (spec §1 external collaborator, §6 CLI
//! surface). Grounded on `kade_drive/cli.py`'s `start_cli` command loop
//! (`put`/`get`/`delete`/`list`/`help`/`exit`, "use help to see supported
//! commands" on an unknown command) and `kade_drive/client.py`'s
//! `ClientSession.connect(use_broadcast_if_needed=True)` for falling back
//! to LAN discovery when no entry node was given on the command line.

use clap::Parser;
use color_eyre::Result;
use dfs_networking::discovery::Discovery;
use dfs_networking::rpc::RpcClient;
use dfs_protocol::{ClientRequest, ClientResponse, Id, NodeDescriptor, Request, Response};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

const CALL_TIMEOUT: Duration = Duration::from_secs(10);
const DISCOVERY_WINDOW: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[clap(name = "dfs-cli", version = env!("CARGO_PKG_VERSION"))]
struct Opt {
    /// Address of an entry node, e.g. "127.0.0.1:8086". If omitted, the
    /// shell listens on the LAN discovery channel for a bootstrap
    /// announcement (spec §6 discovery channel).
    entry: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let opt = Opt::parse();

    let entry = match opt.entry {
        Some(addr) => match addr.parse::<SocketAddr>() {
            Ok(addr) => Some(addr),
            Err(err) => {
                eprintln!("invalid entry address {addr}: {err}");
                return Ok(());
            }
        },
        None => find_entry_by_discovery().await,
    };

    let Some(entry) = entry else {
        println!(
            "Error Connecting to the network, please check your connectivity and verify that at least one server is online."
        );
        return Ok(());
    };

    let client = RpcClient::new(CALL_TIMEOUT);
    println!("Welcome to the CLI interface for the distributed file system");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("cli > ");
        use std::io::Write;
        let _ = std::io::stdout().flush();

        let Ok(Some(line)) = lines.next_line().await else {
            break;
        };
        let mut parts = line.split_whitespace();
        let Some(command) = parts.next() else {
            continue;
        };
        let args: Vec<&str> = parts.collect();

        match command {
            "exit" => break,
            "help" => print_help(),
            "put" => run_put(&client, entry, &args).await,
            "get" => run_get(&client, entry, &args).await,
            "delete" => run_delete(&client, entry, &args).await,
            "list" => run_list(&client, entry).await,
            other => println!("command {other} not found, use \"help\" to see supported commands"),
        }
    }
    Ok(())
}

fn print_help() {
    println!(
        "Command - args - description\n\n\
         put - <name> <value> - stores <value> in the network associated with <name>\n\
         get - <name> - gets the value associated with <name>\n\
         delete - <name> - deletes the value associated with <name>\n\
         list - lists every name known to the network\n\
         help - displays this message\n\
         exit - closes the client"
    );
}

async fn run_put(client: &RpcClient, entry: SocketAddr, args: &[&str]) {
    let [name, rest @ ..] = args else {
        println!("usage: put <name> <value>");
        return;
    };
    if rest.is_empty() {
        println!("usage: put <name> <value>");
        return;
    }
    let value = rest.join(" ").into_bytes();
    let request = ClientRequest::Put {
        name: (*name).to_string(),
        value,
    };
    match call(client, entry, request).await {
        Some(ClientResponse::Put(ok)) => println!("result > {ok}"),
        _ => println!("result > request failed, no response from the network"),
    }
}

async fn run_get(client: &RpcClient, entry: SocketAddr, args: &[&str]) {
    let [name] = args else {
        println!("usage: get <name>");
        return;
    };
    let request = ClientRequest::Get {
        name: (*name).to_string(),
    };
    match call(client, entry, request).await {
        Some(ClientResponse::Get(Some(bytes))) => match String::from_utf8(bytes.clone()) {
            Ok(text) => println!("result > {text}"),
            Err(_) => println!("result > {bytes:?}"),
        },
        Some(ClientResponse::Get(None)) => println!("result > not found"),
        _ => println!("result > request failed, no response from the network"),
    }
}

async fn run_delete(client: &RpcClient, entry: SocketAddr, args: &[&str]) {
    let [name] = args else {
        println!("usage: delete <name>");
        return;
    };
    let request = ClientRequest::Delete {
        name: (*name).to_string(),
    };
    match call(client, entry, request).await {
        Some(ClientResponse::Delete(ok)) => println!("result > {ok}"),
        _ => println!("result > request failed, no response from the network"),
    }
}

async fn run_list(client: &RpcClient, entry: SocketAddr) {
    match call(client, entry, ClientRequest::List).await {
        Some(ClientResponse::List(names)) => {
            if names.is_empty() {
                println!("result > (empty)");
            } else {
                println!("result > {}", names.join(", "));
            }
        }
        _ => println!("result > request failed, no response from the network"),
    }
}

async fn call(client: &RpcClient, entry: SocketAddr, request: ClientRequest) -> Option<ClientResponse> {
    match client.call(entry, &Request::Client(request)).await {
        Ok(Response::Client(response)) => Some(response),
        Ok(_) => {
            println!("result > unexpected response shape from the entry node");
            None
        }
        Err(err) => {
            println!("result > {err}");
            None
        }
    }
}

/// Listens for a `"dfs <host> <port>"` announcement on the LAN and
/// returns the first one heard (spec §4.9 `broadcast_listen`).
async fn find_entry_by_discovery() -> Option<SocketAddr> {
    let discovery = Discovery::new("", 0);
    let (host, port) = discovery.listen_once(DISCOVERY_WINDOW).await?;
    let descriptor = NodeDescriptor::new(Id::ZERO, host, port);
    RpcClient::resolve(&descriptor).await.ok()
}
