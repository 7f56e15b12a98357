use std::io::{self, Write};

use itertools::Itertools;
use serde::Serialize;

use crate::data::IdTag;
use crate::metric::{CombinedScore, FeatureRow};

/// 评分表的一行.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ScoreRow {
    /// 测量名.
    pub name: String,

    /// 测量身份标签.
    #[serde(rename = "idTag")]
    pub id_tag: IdTag,

    /// 组合评分.
    pub score: CombinedScore,
}

/// 评分表, 行顺序即加载器中测量的顺序.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ScoreTable {
    rows: Vec<ScoreRow>,
}

impl ScoreTable {
    /// 追加一行.
    pub fn push(&mut self, name: &str, id_tag: IdTag, score: CombinedScore) {
        self.rows.push(ScoreRow {
            name: name.to_string(),
            id_tag,
            score,
        });
    }

    /// 所有行.
    #[inline]
    pub fn rows(&self) -> &[ScoreRow] {
        &self.rows
    }

    /// 行数.
    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// 是否为空.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 按测量名查找.
    pub fn get(&self, name: &str) -> Option<&ScoreRow> {
        self.rows.iter().find(|r| r.name == name)
    }

    /// 以制表符分隔写出. 列为 `name`, `idTag`, `score` 以及 [`FeatureRow::COLUMNS`].
    pub fn write_tsv<W: Write>(&self, mut w: W) -> io::Result<()> {
        let header = ["name", "idTag", "score"]
            .into_iter()
            .chain(FeatureRow::COLUMNS)
            .join("\t");
        writeln!(w, "{header}")?;
        for row in &self.rows {
            let values = row
                .score
                .features()
                .values()
                .iter()
                .map(|v| format!("{v:.6}"))
                .join("\t");
            writeln!(
                w,
                "{}\t{}\t{:.6}\t{values}",
                row.name, row.id_tag, row.score.score
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::ScoreTable;
    use crate::data::IdTag;
    use crate::metric::CombinedScore;
    use crate::test_utils::textured_cube;

    #[test]
    fn test_tsv_layout() {
        let cube = textured_cube((20, 20, 12), 1);
        let score = CombinedScore::create(cube.view(), cube.view()).unwrap();
        let mut table = ScoreTable::default();
        table.push("a", IdTag::from_raw("a__r"), score.clone());
        table.push("b", IdTag::from_raw("b__r"), score);

        let mut buf = Vec::new();
        table.write_tsv(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("name\tidTag\tscore\tlatXCorr\t"));
        assert_eq!(lines[1].split('\t').count(), 12);
        assert!(lines[2].starts_with("b\tb__r\t1.000000"));
        assert_eq!(table.get("a").map(|r| r.id_tag.as_str()), Some("a__r"));
    }
}
