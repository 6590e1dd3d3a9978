//! Prompt text for each request mode.

/// Longest stdout/stderr excerpt sent with a failure diagnosis.
pub const MAX_OUTPUT_EXCERPT: usize = 2000;

const TRUNCATION_MARKER: &str = "[...]";

fn os_name() -> &'static str {
    if cfg!(windows) { "Windows" } else { "Linux/Unix" }
}

pub fn translate_system() -> String {
    format!(
        "你是一个Shell命令转换助手，把用户用自然语言描述的操作转换为可以直接在{os} Shell中执行的命令。\n\
         规则：\n\
         1. 只输出命令本身，不要解释，不要Markdown代码块\n\
         2. 避免破坏性操作；删除文件时优先加上 -i 之类的确认选项\n\
         3. 优先使用常见、通用的命令\n\
         4. 复杂操作可以使用管道和重定向\n\
         5. 需求不明确时，给出最接近的通用命令\n\
         6. 输出必须是单个完整的命令",
        os = os_name()
    )
}

pub fn translate_prompt(request: &str) -> String {
    format!(
        "在{}系统上，把下面的需求转换为一条Shell命令，只输出命令：\n{}",
        os_name(),
        request.trim()
    )
}

pub const EXPLAIN_COMMAND_SYSTEM: &str =
    "你是一位Linux教学助手。请清楚地解释Linux命令的语法、各个参数的含义以及执行后的效果。";

pub fn explain_command_prompt(command: &str) -> String {
    let command = command.trim();
    format!(
        "请解释下面这条Linux命令：\n{command}\n\n\
         按以下格式回答：\n\
         【命令】\n{command}\n\
         【语法】\n命令的基本语法\n\
         【参数解析】\n逐个说明命令中用到的参数\n\
         【预期结果】\n执行后会看到的输出或产生的效果\n\
         【注意事项】\n权限要求、风险等需要注意的地方"
    )
}

pub const EXPLAIN_NL_SYSTEM: &str =
    "你是一位Linux教学助手。请把自然语言需求转换为准确的Linux命令，并给出通俗易懂的讲解。";

pub fn explain_nl_prompt(request: &str) -> String {
    format!(
        "请把下面的需求转换为Linux命令并讲解：\n{}\n\n\
         按以下格式回答：\n\
         【命令】\n只写命令本身\n\
         【解释】\n命令的语法和每个参数的作用\n\
         【示例】\n常见使用场景（如果有）",
        request.trim()
    )
}

pub const DIAGNOSE_SYSTEM: &str =
    "你是一位Linux系统专家。请分析命令执行失败的原因，并给出简洁的解决办法。";

pub fn diagnose_prompt(command: &str, stdout: &str, stderr: &str, exit_code: Option<i32>) -> String {
    let exit = exit_code.map_or_else(|| "未知（被信号终止或超时）".to_string(), |c| c.to_string());
    format!(
        "命令 '{}' 执行失败，退出码：{}\n\n标准输出：\n{}\n\n标准错误：\n{}\n\n\
         请说明可能的原因，并尽量给出具体的修复命令或步骤。",
        command,
        exit,
        excerpt(stdout, MAX_OUTPUT_EXCERPT),
        excerpt(stderr, MAX_OUTPUT_EXCERPT)
    )
}

/// First `max_chars` characters of `text`, marked when something was cut.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{}", &text[..cut], TRUNCATION_MARKER),
        None => text.to_string(),
    }
}
