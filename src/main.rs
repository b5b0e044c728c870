use std::sync::Arc;

use clap::Parser;
use log::{info, warn};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::chat::{Chat, ChatState, StopReason};
use crate::client::{Interrupt, TerminalRenderer, on_interrupt, spawn_interrupts, spawn_stdin_lines};
use crate::commands::Command;
use crate::config::Config;
use crate::model::AgentModel;
use crate::model::openai::OpenAiModel;
use crate::prompt::PromptUse;
use crate::proxy::{CacheProxy, DiskCacheStorage, HttpFetcher, ProxyRequest};
use crate::store::{JsonFileStore, Persistence};

mod chat;
mod client;
mod commands;
mod config;
mod connection;
mod error;
mod model;
mod prompt;
mod proxy;
mod store;

const LOG_CONFIG_PATH: &str = "log4rs.yaml";

/// 创建默认的log4rs配置文件
fn create_default_log4rs_config() -> anyhow::Result<()> {
    let default_config = r#"---
# log4rs.yaml
# 检查配置文件变动的时间间隔
refresh_rate: 30 seconds
appenders:
  stdout:
    kind: console
  file:
    kind: file
    path: "log/chat-studio.log"
    encoder:
      pattern: "[{d(%Y-%m-%d %H:%M:%S)}][{level}][{f}]:{line} - {m}{n}"
# 全局日志等级
root:
  level: warn
  appenders:
    - file
"#;
    std::fs::write(LOG_CONFIG_PATH, default_config)?;
    Ok(())
}

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// 发送一条消息后退出
    #[arg(short, long)]
    prompt: Option<String>,
    /// 是否流式输出（默认使用已保存的设置）
    #[arg(short, long)]
    stream: Option<bool>,
    /// 进入交互模式
    #[arg(short, long, default_value_t = false)]
    wait: bool,
    /// 使用的模型
    #[arg(short, long)]
    model: Option<String>,
    /// 系统提示
    #[arg(long)]
    system: Option<String>,
    /// 在新对话中发送
    #[arg(long, default_value_t = false)]
    new_chat: bool,
    /// 配置文件路径
    #[arg(short, long, default_value = "config.json")]
    config: String,
    /// 预取静态资源到离线缓存
    #[arg(long, default_value_t = false)]
    prewarm: bool,
    /// 通过离线缓存获取一个静态资源并输出到 stdout
    #[arg(long)]
    asset: Option<String>,
    /// 以页面导航方式请求 --asset
    #[arg(long, default_value_t = false)]
    asset_navigate: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if !std::path::Path::new(LOG_CONFIG_PATH).exists() {
        create_default_log4rs_config()?;
    }
    log4rs::init_file(LOG_CONFIG_PATH, Default::default())?;
    info!("{:?}", args);

    let config = Config::from_path(&args.config)?;

    if args.prewarm || args.asset.is_some() {
        return run_asset_mode(&args, &config).await;
    }

    let store_path = config
        .store_path
        .clone()
        .unwrap_or_else(JsonFileStore::default_path);
    let file_store = JsonFileStore::new(store_path);
    info!("本地数据 {}", file_store.path().display());
    let store: Arc<dyn Persistence> = Arc::new(file_store);
    let mut state = ChatState::load(store).await?;
    config.apply(&mut state.record);
    if let Some(key) = &config.api_key {
        state.override_api_key(key.as_str());
    }
    if let Some(model) = &args.model {
        state.record.params.model = model.clone();
    }
    if let Some(stream) = args.stream {
        state.record.params.stream = stream;
    }
    if args.new_chat {
        state.create_chat();
    }
    if let Some(system) = args.system.as_ref().or(config.system_prompt.as_ref()) {
        state.ensure_chat();
        state.set_system_prompt(system);
    }

    let model = OpenAiModel::new(state.record.api_base.clone(), state.api_key());
    let mut chat = Chat::new(state, model);
    let mut interrupts = spawn_interrupts();

    if args.wait || args.prompt.is_none() {
        wait_mode(&mut chat, &mut interrupts).await?;
    } else if let Some(prompt) = &args.prompt {
        send_message(&mut chat, prompt, &mut interrupts).await;
    }
    chat.state.persist().await;
    Ok(())
}

/// 发送一条消息，Ctrl-C 停止生成
async fn send_message<M: AgentModel>(
    chat: &mut Chat<M>,
    text: &str,
    interrupts: &mut UnboundedReceiver<()>,
) {
    let token = match chat.start_generation(text) {
        Ok(token) => token,
        Err(e) => {
            eprintln!("错误: {}", e.user_message());
            return;
        }
    };
    // 生成开始前积压的 Ctrl-C 不算
    while interrupts.try_recv().is_ok() {}

    let mut renderer = TerminalRenderer::stdout();
    let result = {
        let run = chat.run_generation(&mut renderer);
        tokio::pin!(run);
        loop {
            tokio::select! {
                result = &mut run => break result,
                Some(()) = interrupts.recv() => token.cancel(),
            }
        }
    };

    match result {
        Ok(outcome) => {
            if outcome.reason == StopReason::Cancelled {
                eprintln!("已停止生成");
            }
            if outcome.first_exchange && chat.state.derive_title(&outcome.chat_id) {
                chat.state.persist().await;
            }
        }
        Err(e) => eprintln!("错误: {}", e.user_message()),
    }
}

async fn wait_mode<M: AgentModel>(
    chat: &mut Chat<M>,
    interrupts: &mut UnboundedReceiver<()>,
) -> anyhow::Result<()> {
    let mut stdout = tokio::io::stdout();
    let mut lines = spawn_stdin_lines();
    println!("进入交互模式，输入 '/help' 查看指令，'exit' 或 Ctrl-C 退出");

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
        let line = tokio::select! {
            line = lines.recv() => line,
            Some(()) = interrupts.recv() => match on_interrupt(chat) {
                Interrupt::Cancelled => continue,
                Interrupt::Exit => {
                    println!();
                    println!("退出交互模式");
                    break;
                }
            },
        };
        let Some(line) = line else {
            break;
        };
        match commands::parse(&line) {
            Command::Send(text) if text.is_empty() => {}
            Command::Send(text) => send_message(chat, &text, interrupts).await,
            Command::Exit => {
                println!("退出交互模式");
                break;
            }
            Command::NewChat => {
                let id = chat.state.create_chat();
                println!("新对话 {}", id);
            }
            Command::ListChats => {
                let current = chat.state.record.current_chat_id.clone();
                for c in chat.state.record.chats_by_recency() {
                    let mark = if current.as_deref() == Some(c.id.as_str()) { "*" } else { " " };
                    println!("{} {}  {} ({} 条消息)", mark, c.id, c.title, c.messages.len());
                }
            }
            Command::OpenChat(id) => match chat.state.select_chat(&id) {
                Ok(()) => println!("已切换到 {}", id),
                Err(e) => eprintln!("错误: {}", e.user_message()),
            },
            Command::DeleteChat(id) => match chat.state.delete_chat(&id) {
                Ok(true) => println!("对话已删除"),
                Ok(false) => eprintln!("对话不存在: {}", id),
                Err(e) => eprintln!("错误: {}", e.user_message()),
            },
            Command::SetSystem(text) => {
                chat.state.ensure_chat();
                chat.state.set_system_prompt(&text);
                println!("已设置系统提示");
            }
            Command::ClearSystem => {
                chat.state.clear_system_prompt();
                println!("已清除系统提示");
            }
            Command::ListPrompts => {
                for p in &chat.state.record.saved_prompts {
                    let kind = if p.is_system { "系统" } else { "输入" };
                    println!("[{}] {}: {}", kind, p.name, p.content);
                }
            }
            Command::UsePrompt(name) => {
                chat.state.ensure_chat();
                match chat.state.use_prompt(&name) {
                    Some(PromptUse::System(_)) => println!("已设置系统提示"),
                    Some(PromptUse::Input(content)) => {
                        send_message(chat, &content, interrupts).await
                    }
                    None => eprintln!("找不到 Prompt: {}", name),
                }
            }
            Command::AddPrompt {
                name,
                content,
                is_system,
            } => match prompt::add_prompt(
                &mut chat.state.record.saved_prompts,
                &name,
                &content,
                is_system,
            ) {
                Ok(_) => println!("Prompt 已保存"),
                Err(e) => eprintln!("错误: {}", e.user_message()),
            },
            Command::EditPrompt { name, content } => {
                let prompts = &mut chat.state.record.saved_prompts;
                let existing = prompt::find_by_name(prompts, &name).map(|p| (p.id.clone(), p.is_system));
                match existing {
                    Some((id, is_system)) => {
                        match prompt::update_prompt(prompts, &id, &name, &content, is_system) {
                            Ok(_) => println!("Prompt 已修改"),
                            Err(e) => eprintln!("错误: {}", e.user_message()),
                        }
                    }
                    None => eprintln!("找不到 Prompt: {}", name),
                }
            }
            Command::RemovePrompt(name) => {
                let id = prompt::find_by_name(&chat.state.record.saved_prompts, &name)
                    .map(|p| p.id.clone());
                match id {
                    Some(id) => {
                        prompt::remove_prompt(&mut chat.state.record.saved_prompts, &id);
                        println!("Prompt 已删除");
                    }
                    None => eprintln!("找不到 Prompt: {}", name),
                }
            }
            Command::Help => println!("{}", commands::HELP),
            Command::Unknown(name) => eprintln!("未知指令: /{}", name),
        }
        chat.state.persist().await;
    }
    Ok(())
}

/// 静态资源缓存：预取或读取单个资源
async fn run_asset_mode(args: &Args, config: &Config) -> anyhow::Result<()> {
    let cache = &config.cache;
    let root = cache.dir.clone().unwrap_or_else(DiskCacheStorage::default_root);
    let proxy = CacheProxy::new(
        cache.generation.clone(),
        &cache.origin,
        cache.manifest.clone(),
        cache.entry_point.clone(),
        Arc::new(DiskCacheStorage::new(root)),
        Arc::new(HttpFetcher::new()),
    )?;

    if args.prewarm {
        proxy.install().await?;
        eprintln!("已缓存 {} 个静态资源 ({})", cache.manifest.len(), proxy.generation());
    } else {
        proxy.activate().await?;
    }

    if let Some(path) = &args.asset {
        let url = proxy.resolve(path)?;
        let request = if args.asset_navigate {
            ProxyRequest::navigate(&url)?
        } else {
            ProxyRequest::get(&url)?
        };
        let response = proxy.handle(request).await?;
        if !response.is_success() {
            warn!("{} 返回 {}", url, response.status);
        }
        let mut stdout = tokio::io::stdout();
        stdout.write_all(&response.body).await?;
        stdout.flush().await?;
    }
    proxy.settle().await;
    Ok(())
}
