//! 監視状態（チャレンジのスナップショットと日次レポートのカーソル）の永続化。

use std::{
    fs::{self, File},
    io::Write as _,
    path::{Path, PathBuf},
};

use anyhow::{Context as _, Result};
use serde::{Serialize, de::DeserializeOwned};

use crate::dreamhack::Challenge;
use crate::stats::StatsCursor;

pub const CHALLENGES_FILE: &str = "challenges.json";
pub const STATS_FILE: &str = "stats.json";

/// 監視ループが読み書きする 2 つの状態レコード。
///
/// 存在しないレコードの読み込みはエラーではなく空の値を返す。
pub trait StateStore {
    fn load_snapshot(&self) -> Result<Vec<Challenge>>;
    fn save_snapshot(&self, snapshot: &[Challenge]) -> Result<()>;
    fn load_cursor(&self) -> Result<StatsCursor>;
    fn save_cursor(&self, cursor: &StatsCursor) -> Result<()>;
}

/// ディレクトリ内の JSON ファイルに状態を保存するストア。
pub struct JsonFileStore {
    challenges_path: PathBuf,
    stats_path: PathBuf,
}

impl JsonFileStore {
    /// `dir` 以下に状態ファイルを置くストアを作成する。ディレクトリがなければ作る。
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create state directory: {}", dir.display()))?;

        Ok(Self {
            challenges_path: dir.join(CHALLENGES_FILE),
            stats_path: dir.join(STATS_FILE),
        })
    }
}

impl StateStore for JsonFileStore {
    fn load_snapshot(&self) -> Result<Vec<Challenge>> {
        Ok(read_json(&self.challenges_path)?.unwrap_or_default())
    }

    fn save_snapshot(&self, snapshot: &[Challenge]) -> Result<()> {
        write_json_atomic(&self.challenges_path, snapshot)
    }

    fn load_cursor(&self) -> Result<StatsCursor> {
        Ok(read_json(&self.stats_path)?.unwrap_or_default())
    }

    fn save_cursor(&self, cursor: &StatsCursor) -> Result<()> {
        write_json_atomic(&self.stats_path, cursor)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read state file: {}", path.display()))?;
    let value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse state file: {}", path.display()))?;
    Ok(Some(value))
}

/// 一時ファイルに書き出してディスクに同期してから rename し、
/// 書きかけや空のファイルが見えないようにする。
fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_string(value).context("Failed to serialize state")?;
    let tmp_path = temp_path(path);

    let mut file = File::create(&tmp_path)
        .with_context(|| format!("Failed to create state file: {}", tmp_path.display()))?;
    file.write_all(content.as_bytes())
        .and_then(|()| file.sync_all())
        .with_context(|| format!("Failed to write state file: {}", tmp_path.display()))?;
    drop(file);

    fs::rename(&tmp_path, path)
        .with_context(|| format!("Failed to replace state file: {}", path.display()))?;
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    path.with_file_name(tmp_name)
}
