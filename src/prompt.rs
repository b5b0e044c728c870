use serde::{Deserialize, Serialize};

use crate::error::ChatError;

/// 常用 Prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedPrompt {
    pub id: String,
    pub name: String,
    pub content: String,
    #[serde(default)]
    pub is_system: bool,
}

/// 使用 Prompt 的效果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptUse {
    /// 设为系统提示
    System(String),
    /// 填入输入框
    Input(String),
}

impl SavedPrompt {
    pub fn apply(&self) -> PromptUse {
        if self.is_system {
            PromptUse::System(self.content.clone())
        } else {
            PromptUse::Input(self.content.clone())
        }
    }
}

fn validate(name: &str, content: &str) -> Result<(String, String), ChatError> {
    let name = name.trim();
    let content = content.trim();
    if name.is_empty() || content.is_empty() {
        return Err(ChatError::InvalidPrompt("请填写名称和内容".into()));
    }
    Ok((name.to_string(), content.to_string()))
}

/// 新增 Prompt，返回新 id
pub fn add_prompt(
    prompts: &mut Vec<SavedPrompt>,
    name: &str,
    content: &str,
    is_system: bool,
) -> Result<String, ChatError> {
    let (name, content) = validate(name, content)?;
    let id = uuid::Uuid::new_v4().to_string();
    prompts.push(SavedPrompt {
        id: id.clone(),
        name,
        content,
        is_system,
    });
    Ok(id)
}

/// 修改 Prompt，id 不存在时返回 false
pub fn update_prompt(
    prompts: &mut [SavedPrompt],
    id: &str,
    name: &str,
    content: &str,
    is_system: bool,
) -> Result<bool, ChatError> {
    let (name, content) = validate(name, content)?;
    let Some(prompt) = prompts.iter_mut().find(|p| p.id == id) else {
        return Ok(false);
    };
    prompt.name = name;
    prompt.content = content;
    prompt.is_system = is_system;
    Ok(true)
}

pub fn remove_prompt(prompts: &mut Vec<SavedPrompt>, id: &str) -> bool {
    let before = prompts.len();
    prompts.retain(|p| p.id != id);
    prompts.len() != before
}

pub fn find_by_name<'a>(prompts: &'a [SavedPrompt], name: &str) -> Option<&'a SavedPrompt> {
    prompts.iter().find(|p| p.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_update_remove() {
        let mut prompts = Vec::new();
        let id = add_prompt(&mut prompts, "  翻译 ", "翻译成英文", false).unwrap();
        assert_eq!(prompts[0].name, "翻译");
        assert_eq!(prompts[0].apply(), PromptUse::Input("翻译成英文".into()));

        assert!(update_prompt(&mut prompts, &id, "翻译", "你是翻译助手", true).unwrap());
        assert_eq!(prompts[0].apply(), PromptUse::System("你是翻译助手".into()));
        assert!(!update_prompt(&mut prompts, "missing", "a", "b", false).unwrap());

        assert!(find_by_name(&prompts, "翻译").is_some());
        assert!(remove_prompt(&mut prompts, &id));
        assert!(!remove_prompt(&mut prompts, &id));
        assert!(prompts.is_empty());
    }

    #[test]
    fn empty_fields_are_rejected() {
        let mut prompts = Vec::new();
        assert!(add_prompt(&mut prompts, " ", "content", false).is_err());
        assert!(add_prompt(&mut prompts, "name", "", false).is_err());
        assert!(prompts.is_empty());
    }
}
