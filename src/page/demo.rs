use async_trait::async_trait;
use serde_json::{json, Value};

use super::{PageBridge, PageScript};
use crate::error::Result;

const FRUITS: [&str; 6] = ["Apple", "Banana", "Orange", "Grape", "Watermelon", "Mango"];

/// Walks through every bridge method in order, announcing each outcome with
/// a toast. Failures of one step do not stop the next.
#[derive(Debug, Default, Clone, Copy)]
pub struct DemoScript;

#[async_trait]
impl PageScript for DemoScript {
    async fn run(&self, page: PageBridge) -> Result<String> {
        page.register_validator("validateName", validate_name).await;

        page.show_toast("This toast comes from the page and disappears quickly.");
        page.show_toast("All demos will now run in order...");

        demo_alert(&page).await;
        demo_prompt(&page).await;
        demo_single_selection(&page).await;
        page.show_toast("All dialog demos finished!");

        demo_save_courses(&page).await;
        demo_save_time_slots(&page).await;
        demo_notify_completion(&page).await;

        Ok("Demo script finished".to_string())
    }
}

/// Rejects blank names and names shorter than two characters.
pub fn validate_name(name: &str) -> Option<String> {
    if name.trim().is_empty() {
        return Some("Input cannot be empty!".to_string());
    }
    if name.chars().count() < 2 {
        return Some("Name needs at least 2 characters!".to_string());
    }
    None
}

async fn demo_alert(page: &PageBridge) {
    match page
        .show_alert(
            "Important notice",
            "This dialog was opened with async/await.",
            "Got it",
        )
        .await
    {
        Ok(Value::Bool(true)) => page.show_toast("Alert: confirmed!"),
        Ok(_) => page.show_toast("Alert: dismissed!"),
        Err(e) => page.show_toast(&format!("Alert: could not show dialog! {}", e)),
    }
}

async fn demo_prompt(page: &PageBridge) {
    match page
        .show_prompt(
            "Enter your name",
            "At least 2 characters",
            "Test User",
            Some("validateName"),
        )
        .await
    {
        Ok(Value::Null) => page.show_toast("Prompt: input cancelled!"),
        Ok(Value::String(name)) => page.show_toast(&format!("Welcome, {}!", name)),
        Ok(other) => page.show_toast(&format!("Welcome, {}!", other)),
        Err(e) => page.show_toast(&format!("Prompt: could not show dialog! {}", e)),
    }
}

async fn demo_single_selection(page: &PageBridge) {
    match page
        .show_single_selection("Pick your favourite fruit", &FRUITS, Some(2))
        .await
    {
        Ok(value) => match value.as_u64().and_then(|i| FRUITS.get(i as usize)) {
            Some(fruit) => page.show_toast(&format!("You picked {}", fruit)),
            None => page.show_toast("Single selection: cancelled!"),
        },
        Err(e) => page.show_toast(&format!("Single selection: could not show list! {}", e)),
    }
}

async fn demo_save_courses(page: &PageBridge) {
    let courses = json!([
        {
            "name": "Advanced Mathematics",
            "teacher": "Prof. Zhang",
            "position": "Teaching Building 101",
            "day": 1,
            "startSection": 1,
            "endSection": 2,
            "weeks": [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16]
        },
        {
            "name": "College English",
            "teacher": "Ms. Li",
            "position": "Humanities 203",
            "day": 3,
            "startSection": 3,
            "endSection": 5,
            "weeks": [1, 3, 5, 7, 9, 11, 13, 15]
        },
        {
            "name": "Data Structures",
            "teacher": "Assoc. Prof. Wang",
            "position": "Information B301",
            "day": 5,
            "startSection": 6,
            "endSection": 8,
            "weeks": [2, 4, 6, 8, 10, 12, 14, 16]
        }
    ]);

    match page.save_imported_courses(&pretty(&courses)).await {
        Ok(Value::Bool(true)) => page.show_toast("Test courses imported!"),
        Ok(other) => page.show_toast(&format!("Course import did not succeed: {}", other)),
        Err(e) => page.show_toast(&format!("Course import failed: {}", e)),
    }
}

async fn demo_save_time_slots(page: &PageBridge) {
    let time_slots = json!([
        { "number": 1, "startTime": "08:00", "endTime": "08:45" },
        { "number": 2, "startTime": "08:55", "endTime": "09:40" },
        { "number": 3, "startTime": "10:00", "endTime": "10:45" },
        { "number": 4, "startTime": "10:55", "endTime": "11:40" }
    ]);

    match page.save_preset_time_slots(&pretty(&time_slots)).await {
        Ok(Value::Bool(true)) => page.show_toast("Time slots imported!"),
        Ok(other) => page.show_toast(&format!("Time slot import did not succeed: {}", other)),
        Err(e) => page.show_toast(&format!("Time slot import failed: {}", e)),
    }
}

async fn demo_notify_completion(page: &PageBridge) {
    if let Err(e) = page.notify_task_completion().await {
        page.show_toast(&format!("Could not finish the import: {}", e));
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_name_rules() {
        assert_eq!(validate_name("   ").as_deref(), Some("Input cannot be empty!"));
        assert_eq!(
            validate_name("A").as_deref(),
            Some("Name needs at least 2 characters!")
        );
        assert_eq!(validate_name("Al"), None);
    }
}
