// Two-screen navigation: welcome -> task list

pub const WELCOME_TITLE: &str = "Welcome to Your To-Do List App";
pub const WELCOME_ACTION: &str = "Go to To-Do List";
pub const LIST_TITLE: &str = "To-Do List";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Screen {
    #[default]
    Welcome,
    TaskList,
}

/// Tracks which screen is showing
#[derive(Debug, Default)]
pub struct Navigator {
    current: Screen,
}

impl Navigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Screen {
        self.current
    }

    pub fn navigate_to_task_list(&mut self) {
        self.current = Screen::TaskList;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_on_welcome() {
        assert_eq!(Navigator::new().current(), Screen::Welcome);
    }

    #[test]
    fn test_navigate_is_idempotent() {
        let mut nav = Navigator::new();
        nav.navigate_to_task_list();
        nav.navigate_to_task_list();
        assert_eq!(nav.current(), Screen::TaskList);
    }
}
