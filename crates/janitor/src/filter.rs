//! 레이블 필터
//!
//! 무시 레이블이나 예약 레이블([`RESERVED_LABEL`])이 붙은 엔티티를 삭제 후보에서 제외합니다.
//! 레이블은 키만 비교하며 값은 보지 않습니다.

use scour_core::types::{Labeled, RESERVED_LABEL};

/// 엔티티가 보호 레이블을 하나라도 가지고 있는지 확인합니다.
pub fn is_ignored<T: Labeled>(entity: &T, ignore_labels: &[String]) -> bool {
    let labels = entity.labels();
    labels.contains_key(RESERVED_LABEL) || ignore_labels.iter().any(|l| labels.contains_key(l))
}

/// 보호 레이블이 붙은 엔티티를 제거합니다. 남은 엔티티의 순서는 유지됩니다.
pub fn filter_ignored<T: Labeled>(entities: Vec<T>, ignore_labels: &[String]) -> Vec<T> {
    entities
        .into_iter()
        .filter(|entity| !is_ignored(entity, ignore_labels))
        .collect()
}
