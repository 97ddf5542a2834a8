use super::Output;
use crate::diagnostics;
use crate::error::AppResult;
use crate::AppState;

pub fn about(state: &AppState, out: &Output) -> AppResult<()> {
    let info = diagnostics::get_about_info(&state.data_dir, Some(&state.db));
    out.show(&info, || {
        let field = |key: &str| {
            info.get(key)
                .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
                .unwrap_or_default()
        };
        format!(
            "PureDrop {} ({}, built {})\nPlatform: {}/{}\nBackend:  {}\nData dir: {}\nLog dir:  {}\nSchema:   v{}",
            field("version"),
            field("gitSha"),
            field("buildTimestamp"),
            field("platform"),
            field("arch"),
            state.backend.base_url(),
            field("dataDir"),
            field("logDir"),
            field("schemaVersion"),
        )
    })
}
