use std::fmt;

use serde::{Deserialize, Serialize};

/// 文件名中不允许出现的字符.
const RESERVED: [char; 9] = [':', '/', '\\', '<', '>', '"', '|', '?', '*'];

/// 测量的稳定身份标签, 可直接用作文件名.
///
/// 由采集自身的身份和其参考采集的身份派生, 二者以 `__` 连接.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IdTag(String);

impl IdTag {
    /// 由采集身份 `acquisition_id` 和参考采集身份 `reference_id` 派生标签.
    /// 结果对相同输入总是相同.
    pub fn derive(acquisition_id: &str, reference_id: &str) -> Self {
        Self(format!(
            "{}__{}",
            sanitize(acquisition_id),
            sanitize(reference_id)
        ))
    }

    /// 直接包装一个已经合法的标签 (例如从缓存文件名中解析得到的).
    ///
    /// 非法字符仍会被替换.
    #[inline]
    pub fn from_raw(raw: &str) -> Self {
        Self(sanitize(raw))
    }

    /// 标签字符串.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdTag {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for IdTag {
    #[inline]
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// 将保留字符替换为 `_`.
fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| if RESERVED.contains(&c) { '_' } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::IdTag;

    #[test]
    fn test_derive_sanitizes_colons() {
        let tag = IdTag::derive("pws:2020:10:20:cell1", "pws:2020:10:20:cell999");
        assert_eq!(tag.as_str(), "pws_2020_10_20_cell1__pws_2020_10_20_cell999");
        assert!(!tag.as_str().contains(':'));
    }

    #[test]
    fn test_derive_is_deterministic() {
        assert_eq!(IdTag::derive("a/b", "c"), IdTag::derive("a/b", "c"));
        assert_eq!(IdTag::derive("a/b", "c").to_string(), "a_b__c");
        assert_ne!(IdTag::derive("a", "b"), IdTag::derive("b", "a"));
    }
}
