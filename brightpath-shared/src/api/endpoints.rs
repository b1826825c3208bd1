use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};

use super::API_V1_PREFIX;

fn base_join(base: &str, path: &str) -> String {
    let b = base.trim_end_matches('/');
    let p = path.trim_start_matches('/');
    format!("{}/{}", b, p)
}

fn enc(s: &str) -> String {
    utf8_percent_encode(s, NON_ALPHANUMERIC).to_string()
}

pub fn auth_login(base: &str) -> String {
    base_join(base, &format!("{}/auth/login", API_V1_PREFIX))
}
pub fn children(base: &str) -> String {
    base_join(base, &format!("{}/children", API_V1_PREFIX))
}
pub fn children_link(base: &str) -> String {
    base_join(base, &format!("{}/children/link", API_V1_PREFIX))
}
pub fn modules(base: &str) -> String {
    base_join(base, &format!("{}/modules", API_V1_PREFIX))
}
pub fn child_assignments(base: &str, child_id: &str) -> String {
    base_join(
        base,
        &format!("{}/children/{}/assignments", API_V1_PREFIX, enc(child_id)),
    )
}
pub fn child_progress(base: &str, child_id: &str, module_id: &str) -> String {
    base_join(
        base,
        &format!(
            "{}/children/{}/progress/{}",
            API_V1_PREFIX,
            enc(child_id),
            enc(module_id)
        ),
    )
}
pub fn child_tasks(base: &str, child_id: &str) -> String {
    base_join(
        base,
        &format!("{}/children/{}/tasks", API_V1_PREFIX, enc(child_id)),
    )
}
pub fn child_task(base: &str, child_id: &str, task_id: i32) -> String {
    base_join(
        base,
        &format!(
            "{}/children/{}/tasks/{}",
            API_V1_PREFIX,
            enc(child_id),
            task_id
        ),
    )
}
pub fn child_xp(base: &str, child_id: &str) -> String {
    base_join(
        base,
        &format!("{}/children/{}/xp", API_V1_PREFIX, enc(child_id)),
    )
}
pub fn child_avatar(base: &str, child_id: &str) -> String {
    base_join(
        base,
        &format!("{}/children/{}/avatar", API_V1_PREFIX, enc(child_id)),
    )
}
