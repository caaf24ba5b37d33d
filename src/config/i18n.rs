//! Internationalization (i18n) module for console messages.

/// UI messages structure
#[derive(Debug, Clone)]
pub struct Messages {
    pub thinking: &'static str,
    pub action: &'static str,
    pub task_completed: &'static str,
    pub done: &'static str,
    pub starting_task: &'static str,
    pub task_result: &'static str,
    pub confirmation_required: &'static str,
    pub manual_operation_required: &'static str,
    pub press_enter_when_done: &'static str,
    pub step: &'static str,
    pub task: &'static str,
    pub result: &'static str,
}

/// Chinese messages
pub static MESSAGES_ZH: Messages = Messages {
    thinking: "思考过程",
    action: "执行动作",
    task_completed: "任务完成",
    done: "完成",
    starting_task: "开始执行任务",
    task_result: "任务结果",
    confirmation_required: "需要确认",
    manual_operation_required: "需要人工操作",
    press_enter_when_done: "完成后按回车继续",
    step: "步骤",
    task: "任务",
    result: "结果",
};

/// English messages
pub static MESSAGES_EN: Messages = Messages {
    thinking: "Thinking",
    action: "Action",
    task_completed: "Task Completed",
    done: "Done",
    starting_task: "Starting task",
    task_result: "Task Result",
    confirmation_required: "Confirmation Required",
    manual_operation_required: "Manual Operation Required",
    press_enter_when_done: "Press Enter when done",
    step: "Step",
    task: "Task",
    result: "Result",
};

/// Get UI messages by language ("cn" or "en").
pub fn get_messages(lang: &str) -> &'static Messages {
    match lang {
        "en" => &MESSAGES_EN,
        _ => &MESSAGES_ZH,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_messages() {
        assert_eq!(get_messages("cn").thinking, "思考过程");
        assert_eq!(get_messages("en").thinking, "Thinking");
        // Unknown languages fall back to Chinese.
        assert_eq!(get_messages("fr").thinking, "思考过程");
    }
}
