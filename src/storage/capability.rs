use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Operation names of the unified surface / 统一操作集
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Read,
    Write,
    List,
    Copy,
    Rename,
    Stat,
    CreateDir,
    Delete,
    Blocking,
}

impl Operation {
    pub const ALL: [Operation; 9] = [
        Operation::Read,
        Operation::Write,
        Operation::List,
        Operation::Copy,
        Operation::Rename,
        Operation::Stat,
        Operation::CreateDir,
        Operation::Delete,
        Operation::Blocking,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Read => "read",
            Operation::Write => "write",
            Operation::List => "list",
            Operation::Copy => "copy",
            Operation::Rename => "rename",
            Operation::Stat => "stat",
            Operation::CreateDir => "create_dir",
            Operation::Delete => "delete",
            Operation::Blocking => "blocking",
        }
    }

    /// Stable slot index, used by per-operation counters / 计数器下标
    pub(crate) fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "read" => Ok(Operation::Read),
            "write" => Ok(Operation::Write),
            "list" => Ok(Operation::List),
            "copy" => Ok(Operation::Copy),
            "rename" => Ok(Operation::Rename),
            "stat" => Ok(Operation::Stat),
            "create_dir" | "createdir" | "mkdir" => Ok(Operation::CreateDir),
            "delete" | "remove" => Ok(Operation::Delete),
            "blocking" => Ok(Operation::Blocking),
            other => Err(format!("unknown operation: {}", other)),
        }
    }
}

/// Driver capability declaration / 驱动能力声明
///
/// Computed once when the operator is built and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capability {
    pub read: bool,
    pub write: bool,
    pub list: bool,
    pub copy: bool,
    pub rename: bool,
    pub stat: bool,
    pub create_dir: bool,
    pub delete: bool,
    /// Synchronous call style is available / 支持阻塞调用
    pub blocking: bool,

    /// Readers can seek and ranges can be read / 支持范围读取
    pub read_can_seek: bool,
    /// Rename is a single atomic backend call, not copy + delete / 重命名是否原子
    pub rename_is_atomic: bool,
    /// Copy happens inside the backend without streaming bytes back / 支持服务端复制
    pub copy_is_native: bool,
    /// Content type can be stored with an object / 支持保存内容类型
    pub write_can_content_type: bool,
    /// Entries per list page, `None` means the whole directory in one page / 分页大小
    pub list_page_size: Option<usize>,
}

impl Default for Capability {
    fn default() -> Self {
        Self {
            read: false,
            write: false,
            list: false,
            copy: false,
            rename: false,
            stat: false,
            create_dir: false,
            delete: false,
            blocking: false,
            read_can_seek: false,
            rename_is_atomic: false,
            copy_is_native: false,
            write_can_content_type: false,
            list_page_size: None,
        }
    }
}

impl Capability {
    pub fn supports(&self, op: Operation) -> bool {
        match op {
            Operation::Read => self.read,
            Operation::Write => self.write,
            Operation::List => self.list,
            Operation::Copy => self.copy,
            Operation::Rename => self.rename,
            Operation::Stat => self.stat,
            Operation::CreateDir => self.create_dir,
            Operation::Delete => self.delete,
            Operation::Blocking => self.blocking,
        }
    }

    /// Mask off the given operations / 关闭指定操作
    pub fn without(mut self, ops: &[Operation]) -> Self {
        for op in ops {
            match op {
                Operation::Read => {
                    self.read = false;
                    self.read_can_seek = false;
                }
                Operation::Write => {
                    self.write = false;
                    self.write_can_content_type = false;
                }
                Operation::List => self.list = false,
                Operation::Copy => {
                    self.copy = false;
                    self.copy_is_native = false;
                }
                Operation::Rename => {
                    self.rename = false;
                    self.rename_is_atomic = false;
                }
                Operation::Stat => self.stat = false,
                Operation::CreateDir => self.create_dir = false,
                Operation::Delete => self.delete = false,
                Operation::Blocking => self.blocking = false,
            }
        }
        self
    }

    /// Supported operations, in declaration order / 已支持的操作
    pub fn supported(&self) -> Vec<Operation> {
        Operation::ALL
            .iter()
            .copied()
            .filter(|op| self.supports(*op))
            .collect()
    }
}

/// Parse a comma separated operation list, e.g. `"rename, copy"` / 解析操作列表
pub fn parse_operations(value: &str) -> Result<Vec<Operation>, String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(Operation::from_str)
        .collect()
}
