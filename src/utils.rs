/// Path processing utility functions / 路径处理工具函数
///
/// Paths handed to drivers are relative, `/`-separated, never start with
/// `/` (except the root itself, which is `"/"`), and end with `/` when they
/// name a directory.

/// Clean and normalize path / 清理和规范化路径
/// 1. Replace backslashes with forward slashes / 将反斜杠替换为正斜杠
/// 2. Drop empty and `.` segments / 去掉空段和 `.`
/// 3. `..` pops a segment but never climbs above the root / `..` 不能越过根目录
/// 4. Keep a trailing slash as directory intent / 保留结尾斜杠
pub fn normalize_path(path: &str) -> String {
    let path = path.replace('\\', "/");
    let is_dir = path.ends_with('/') || path.ends_with("/.") || path.ends_with("/..");

    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => continue,
            ".." => {
                parts.pop();
            }
            _ => parts.push(part),
        }
    }

    if parts.is_empty() {
        return "/".to_string();
    }

    let mut normalized = parts.join("/");
    if is_dir {
        normalized.push('/');
    }
    normalized
}

/// Normalize a root to the `/a/b/` form / 规范化根目录
pub fn normalize_root(root: &str) -> String {
    let root = normalize_path(root);
    if root == "/" {
        root
    } else {
        format!("/{}/", root.trim_end_matches('/'))
    }
}

/// Directory paths end with `/` / 是否为目录路径
pub fn is_dir_path(path: &str) -> bool {
    path.ends_with('/')
}

/// Turn a normalized path into a directory path / 转为目录路径
pub fn as_dir_path(path: &str) -> String {
    if path.ends_with('/') {
        path.to_string()
    } else {
        format!("{}/", path)
    }
}

/// Parent directory of a normalized path, `"/"` at the top / 获取父目录
pub fn parent_dir(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(pos) => trimmed[..=pos].to_string(),
        None => "/".to_string(),
    }
}

/// Last segment, keeping the trailing slash of directories / 获取名称
pub fn get_basename(path: &str) -> &str {
    if path == "/" {
        return path;
    }
    let trimmed = path.trim_end_matches('/');
    let start = trimmed.rfind('/').map(|p| p + 1).unwrap_or(0);
    &path[start..]
}

/// Join a child name onto a directory path / 拼接子路径
pub fn join_path(dir: &str, name: &str) -> String {
    if dir == "/" || dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", dir.trim_end_matches('/'), name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path(""), "/");
        assert_eq!(normalize_path("."), "/");
        assert_eq!(normalize_path(".."), "/");
        assert_eq!(normalize_path("../.."), "/");
        assert_eq!(normalize_path("a/b/c"), "a/b/c");
        assert_eq!(normalize_path("/a/b/c"), "a/b/c");
        assert_eq!(normalize_path("a\\b\\c"), "a/b/c");
        assert_eq!(normalize_path("/a//b///c"), "a/b/c");
        assert_eq!(normalize_path("/a/./b/../c"), "a/c");
        assert_eq!(normalize_path("dir/"), "dir/");
        assert_eq!(normalize_path("dir/sub/.."), "dir/");
        assert_eq!(normalize_path("/"), "/");
    }

    #[test]
    fn test_normalize_root() {
        assert_eq!(normalize_root(""), "/");
        assert_eq!(normalize_root("data"), "/data/");
        assert_eq!(normalize_root("/data/files//"), "/data/files/");
    }

    #[test]
    fn test_parent_and_basename() {
        assert_eq!(parent_dir("a/b/c.txt"), "a/b/");
        assert_eq!(parent_dir("a/b/"), "a/");
        assert_eq!(parent_dir("a.txt"), "/");
        assert_eq!(get_basename("a/b/c.txt"), "c.txt");
        assert_eq!(get_basename("a/b/"), "b/");
        assert_eq!(get_basename("c.txt"), "c.txt");
        assert_eq!(get_basename("/"), "/");
    }

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("/", "a.txt"), "a.txt");
        assert_eq!(join_path("dir/", "a.txt"), "dir/a.txt");
        assert_eq!(join_path("dir/", "sub/"), "dir/sub/");
    }
}
