//! 段落重排 (Paragraph Unscrambler)
//!
//! 站点对超过 20 段的章节，用章节 ID 作种子的线性同余发生器驱动洗牌，
//! 打乱第 20 段之后的段落顺序。这里复现同一发生器以还原阅读顺序。

/// 前 20 段从不参与洗牌
const FIXED_PREFIX: usize = 20;

const LCG_MUL: u64 = 9302;
const LCG_INC: u64 = 49397;
const LCG_MOD: u64 = 233280;

/// 返回目标位置表：第 `i` 个输入段落应放到 `positions[i]`
pub fn permutation(n: usize, chapter_id: u64) -> Vec<usize> {
    if n <= FIXED_PREFIX {
        return (0..n).collect();
    }

    let mut value: Vec<usize> = (0..n - FIXED_PREFIX).collect();

    // 先取模再推进，与 `chapterId * 127 + 235` 同余且不会溢出
    let mut seed = ((chapter_id % LCG_MOD) * 127 + 235) % LCG_MOD;

    for i in (1..value.len()).rev() {
        seed = (seed * LCG_MUL + LCG_INC) % LCG_MOD;
        // 与页面脚本一致的双精度运算
        let pick = (seed as f64 / LCG_MOD as f64 * (i + 1) as f64).floor() as usize;
        value.swap(i, pick);
    }

    (0..FIXED_PREFIX)
        .chain(value.into_iter().map(|v| v + FIXED_PREFIX))
        .collect()
}

/// 按目标位置表把乱序段落放回原位
pub fn unscramble<T>(items: Vec<T>, chapter_id: u64) -> Vec<T> {
    let n = items.len();
    if n <= FIXED_PREFIX {
        return items;
    }

    let positions = permutation(n, chapter_id);
    let mut ordered: Vec<Option<T>> = std::iter::repeat_with(|| None).take(n).collect();
    for (item, &dest) in items.into_iter().zip(positions.iter()) {
        ordered[dest] = Some(item);
    }

    // 置换为双射，每个槽位恰好被填充一次
    ordered.into_iter().flatten().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHAPTER: u64 = 236197;

    #[test]
    fn test_short_chapters_are_identity() {
        for n in 0..=20 {
            let items: Vec<usize> = (0..n).collect();
            assert_eq!(unscramble(items.clone(), CHAPTER), items);
            assert_eq!(permutation(n, CHAPTER), items);
        }
    }

    #[test]
    fn test_permutation_is_bijection() {
        for n in [21, 22, 37, 70, 76, 150, 512] {
            for id in [0, 1, 42, CHAPTER, 9_999_999, u64::MAX] {
                let mut seen = permutation(n, id);
                assert_eq!(seen.len(), n);
                assert_eq!(&seen[..20], &(0..20).collect::<Vec<_>>()[..]);
                seen.sort_unstable();
                assert_eq!(seen, (0..n).collect::<Vec<_>>(), "n={n} id={id}");
            }
        }
    }

    #[test]
    fn test_deterministic() {
        let input: Vec<String> = (0..90).map(|i| format!("p{i}")).collect();
        let a = unscramble(input.clone(), 118);
        let b = unscramble(input, 118);
        assert_eq!(a, b);
    }

    #[test]
    fn test_regression_seventy_paragraphs() {
        let expected_tail = [
            63, 60, 65, 56, 26, 54, 24, 39, 42, 27, 25, 66, 61, 22, 21, 35, 59, 44, 68, 69, 28,
            32, 47, 45, 58, 38, 31, 62, 43, 50, 67, 30, 37, 36, 40, 46, 51, 57, 33, 52, 23, 49,
            64, 41, 29, 20, 53, 34, 55, 48,
        ];
        let positions = permutation(70, CHAPTER);
        assert_eq!(&positions[20..], &expected_tail[..]);
    }

    #[test]
    fn test_regression_seventy_six_paragraphs() {
        let expected_tail = [
            40, 26, 75, 25, 29, 71, 46, 49, 38, 27, 30, 33, 47, 66, 69, 54, 28, 74, 22, 23, 21,
            58, 45, 55, 64, 60, 67, 50, 32, 61, 73, 42, 34, 65, 48, 62, 37, 68, 41, 39, 43, 51,
            56, 63, 35, 72, 24, 53, 70, 44, 31, 20, 57, 36, 59, 52,
        ];
        let positions = permutation(76, CHAPTER);
        assert_eq!(&positions[20..], &expected_tail[..]);
    }

    #[test]
    fn test_small_ids() {
        assert_eq!(&permutation(21, 5)[20..], &[20]);
        assert_eq!(&permutation(25, 1)[20..], &[22, 20, 24, 21, 23]);
        assert_eq!(
            &permutation(30, 42)[20..],
            &[29, 27, 26, 25, 20, 23, 28, 24, 21, 22]
        );
    }

    #[test]
    fn test_unscramble_places_items_at_destination() {
        // 输入第 20 项应落在 positions[20] = 22
        let input: Vec<usize> = (0..25).collect();
        let out = unscramble(input, 1);
        assert_eq!(out[22], 20);
        assert_eq!(out[20], 21);
        assert_eq!(out[24], 22);
        assert_eq!(out[21], 23);
        assert_eq!(out[23], 24);
        assert_eq!(&out[..20], &(0..20).collect::<Vec<_>>()[..]);
    }
}
