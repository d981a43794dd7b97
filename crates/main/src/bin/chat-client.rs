//! 终端聊天客户端
//!
//! 每行输入作为一条消息发送；`/t` 发送输入中信号，`/dismiss <id>` 关闭提示，`/quit` 退出。

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use application::{
    format_online_names, typing_indicator_text, ChatSession, SessionDependencies, SessionHandle,
    SessionObserver, SessionSettings, SystemClock,
};
use clap::Parser;
use config::{AppConfig, TransportKind};
use domain::{ChatMessage, DisplayName, MessageId, NotificationId, ToastNotification};
use infrastructure::ClientInfrastructure;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "chat-client", about = "Realtime chat room client")]
struct Args {
    /// 显示名称
    #[arg(long)]
    name: String,

    /// 覆盖配置中的服务地址
    #[arg(long)]
    server: Option<String>,

    /// 等同于 `client.transport = "local"`：不连接服务，使用进程内的服务和总线
    #[arg(long)]
    local: bool,
}

/// 把会话变化打印到终端
#[derive(Default)]
struct TerminalObserver {
    last_printed: Mutex<Option<MessageId>>,
    seen_toasts: Mutex<HashSet<NotificationId>>,
}

impl SessionObserver for TerminalObserver {
    fn messages_changed(&self, messages: &[ChatMessage]) {
        let mut last = self
            .last_printed
            .lock()
            .unwrap_or_else(|err| err.into_inner());
        for message in messages
            .iter()
            .filter(|message| last.map_or(true, |id| message.id > id))
        {
            println!(
                "[{}] {}: {}",
                message.created_at.format("%H:%M:%S"),
                message.username,
                message.body
            );
        }
        if let Some(message) = messages.last() {
            *last = Some(message.id);
        }
    }

    fn typing_changed(&self, names: &[DisplayName]) {
        if let Some(text) = typing_indicator_text(names) {
            println!("... {text}");
        }
    }

    fn online_changed(&self, names: &[DisplayName]) {
        match format_online_names(names) {
            Some(text) => println!("* {text}"),
            None => println!("* nobody else is here"),
        }
    }

    fn notifications_changed(&self, entries: &[ToastNotification]) {
        let mut seen = self
            .seen_toasts
            .lock()
            .unwrap_or_else(|err| err.into_inner());
        for toast in entries.iter().filter(|toast| seen.insert(toast.id)) {
            println!("! {} ({})", toast.message, toast.id);
        }
        seen.retain(|id| entries.iter().any(|toast| &toast.id == id));
    }

    fn connection_changed(&self, connected: bool) {
        if !connected {
            println!("! connection lost, retrying...");
        }
    }
}

async fn run_commands(handle: &SessionHandle) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" => break,
            "/t" => handle.typing()?,
            _ if line.starts_with("/dismiss ") => {
                let raw = line.trim_start_matches("/dismiss ").trim();
                match Uuid::parse_str(raw) {
                    Ok(id) => {
                        if !handle.dismiss(NotificationId::from(id)).await? {
                            println!("! no such notification");
                        }
                    }
                    Err(_) => println!("! usage: /dismiss <notification id>"),
                }
            }
            text => {
                handle.set_draft(text)?;
                if let Err(err) = handle.submit().await {
                    println!("! failed to send: {err}");
                }
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let mut config = AppConfig::load()?;
    if let Some(server) = args.server {
        config.client.server_url = server;
    }

    if args.local {
        config.client.transport = TransportKind::Local;
    }

    let infra = ClientInfrastructure::connect(&config, &args.name).await?;

    let handle = ChatSession::start(
        SessionDependencies {
            identity: infra.identity,
            backend: infra.backend,
            transport: infra.transport.clone(),
            clock: Arc::new(SystemClock),
            settings: SessionSettings::from(&config.realtime),
        },
        Arc::new(TerminalObserver::default()),
    )
    .await?;

    let result = run_commands(&handle).await;

    handle.shutdown().await?;
    infra.transport.disconnect();
    result
}
