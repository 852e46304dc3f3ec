/*!
 * Common test utilities for the notezh test suite
 */

use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Once};
use tempfile::TempDir;

use notezh::app_config::Config;
use notezh::app_controller::Controller;
use notezh::providers::mock::MockTranslator;

static LOGGER: Once = Once::new();

/// Route library logs through env_logger; `RUST_LOG=debug` shows them
pub fn init_logging() {
    LOGGER.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

/// Creates a temporary directory for test files
pub fn create_temp_dir() -> Result<TempDir> {
    Ok(TempDir::new()?)
}

/// Creates a test file with the given content in the specified directory
pub fn create_test_file(dir: &Path, filename: &str, content: &str) -> Result<PathBuf> {
    let file_path = dir.join(filename);
    fs::write(&file_path, content)?;
    Ok(file_path)
}

/// Lecture-style notes with every kind of protected span
pub const SAMPLE_NOTES: &str = r#"# Static Checking

A closure captures its environment. Call `check(x)` before $x^2 + 1$ grows.

## Example

```python
def square(x):
    return x * x  # $not math$
```

See [the reading](https://example.com/reading "Reading") and <https://example.com/faq>.

| Type | Example |
|------|---------|
| int  | `5`     |

$$
\sum_{i=1}^{n} i
$$

Footnote here[^1].

[^1]: Footnote text.
"#;

/// Config with instant retries and a small worker pool
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.pipeline.concurrency = 2;
    config.translation.common.retry_count = 2;
    config.translation.common.retry_backoff_ms = 1;
    config.translation.common.retry_max_backoff_ms = 2;
    config
}

/// Controller around a mock translator, without progress bars
pub fn mock_controller(config: Config, mock: &MockTranslator) -> Controller {
    init_logging();
    Controller::with_translator(config, Arc::new(mock.clone())).without_progress()
}
