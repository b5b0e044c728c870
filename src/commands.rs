//! 交互模式指令
//!
//! 以 `/` 开头的输入被解析为指令，其余内容作为消息发送。

/// 交互模式下的一行输入
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// 普通消息
    Send(String),
    Exit,
    NewChat,
    ListChats,
    OpenChat(String),
    DeleteChat(String),
    SetSystem(String),
    ClearSystem,
    ListPrompts,
    UsePrompt(String),
    AddPrompt { name: String, content: String, is_system: bool },
    EditPrompt { name: String, content: String },
    RemovePrompt(String),
    Help,
    Unknown(String),
}

pub const HELP: &str = "\
/new                       新建对话
/chats                     列出对话
/open <id>                 切换对话
/delete <id>               删除对话
/system <内容>             设置系统提示
/clear-system              清除系统提示
/prompts                   列出常用 Prompt
/use <名称>                使用常用 Prompt
/prompt-add <名称> <内容>  新增常用 Prompt（/sys-prompt-add 作为系统提示）
/prompt-edit <名称> <内容> 修改常用 Prompt 的内容
/prompt-del <名称>         删除常用 Prompt
exit | quit                退出
生成过程中按 Ctrl-C 停止生成";

fn split_arg(rest: &str) -> (String, String) {
    let rest = rest.trim();
    match rest.split_once(char::is_whitespace) {
        Some((first, tail)) => (first.to_string(), tail.trim().to_string()),
        None => (rest.to_string(), String::new()),
    }
}

pub fn parse(line: &str) -> Command {
    let line = line.trim();
    if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
        return Command::Exit;
    }
    let Some(body) = line.strip_prefix('/') else {
        return Command::Send(line.to_string());
    };
    let (name, rest) = split_arg(body);
    match name.as_str() {
        "new" => Command::NewChat,
        "chats" => Command::ListChats,
        "open" => Command::OpenChat(rest),
        "delete" => Command::DeleteChat(rest),
        "system" => Command::SetSystem(rest),
        "clear-system" => Command::ClearSystem,
        "prompts" => Command::ListPrompts,
        "use" => Command::UsePrompt(rest),
        "prompt-add" | "sys-prompt-add" => {
            let (prompt_name, content) = split_arg(&rest);
            Command::AddPrompt {
                name: prompt_name,
                content,
                is_system: name == "sys-prompt-add",
            }
        }
        "prompt-edit" => {
            let (prompt_name, content) = split_arg(&rest);
            Command::EditPrompt {
                name: prompt_name,
                content,
            }
        }
        "prompt-del" => Command::RemovePrompt(rest),
        "help" => Command::Help,
        _ => Command::Unknown(name),
    }
}
