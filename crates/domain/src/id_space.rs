//! 标识符空间
//!
//! 对每个长度L（从最短到最长）按字符表顺序枚举全部长度为L的组合，
//! 各长度依次拼接成一个确定的序列。通过组合数直接把序号映射为标识符，
//! 取任意位置的一段都不需要遍历之前的元素。

use harvester_core::config::ServiceConfig;
use harvester_core::{HarvesterError, HarvesterResult};

#[derive(Debug, Clone)]
pub struct IdSpace {
    alphabet: Vec<char>,
    min_length: u32,
    max_length: u32,
}

impl IdSpace {
    pub fn new(alphabet: &str, min_length: u32, max_length: u32) -> HarvesterResult<Self> {
        let alphabet: Vec<char> = alphabet.chars().collect();
        if alphabet.is_empty() {
            return Err(HarvesterError::Configuration("字符表不能为空".to_string()));
        }
        if min_length == 0 || min_length > max_length {
            return Err(HarvesterError::Configuration(format!(
                "标识符长度范围无效: {min_length}..={max_length}"
            )));
        }
        Ok(Self {
            alphabet,
            min_length,
            max_length,
        })
    }

    pub fn from_service(service: &ServiceConfig) -> HarvesterResult<Self> {
        Self::new(&service.alphabet, service.min_length, service.max_length)
    }

    /// 空间总大小，超出u128表示范围时返回 None
    pub fn size(&self) -> Option<u128> {
        let base = self.base();
        (self.min_length..=self.max_length)
            .try_fold(0u128, |acc, length| acc.checked_add(base.checked_pow(length)?))
    }

    /// 序号对应的标识符，越过最大长度时返回 None
    pub fn unrank(&self, index: u128) -> Option<String> {
        let base = self.base();
        let mut rest = index;

        for length in self.min_length..=self.max_length {
            match base.checked_pow(length) {
                Some(block) if rest >= block => rest -= block,
                // 该长度的组合数溢出u128时，任何u128序号都落在其中
                _ => return Some(self.spell(rest, length)),
            }
        }

        None
    }

    /// 取 `[start, start + count)`，空间耗尽时返回的数量会少于 `count`
    pub fn slice(&self, start: u128, count: usize) -> Vec<String> {
        let mut out = Vec::with_capacity(count);
        for offset in 0..count as u128 {
            let Some(index) = start.checked_add(offset) else {
                break;
            };
            match self.unrank(index) {
                Some(identifier) => out.push(identifier),
                None => break,
            }
        }
        out
    }

    fn base(&self) -> u128 {
        self.alphabet.len() as u128
    }

    fn spell(&self, mut rest: u128, length: u32) -> String {
        let base = self.base();
        let mut chars = vec![self.alphabet[0]; length as usize];
        for slot in chars.iter_mut().rev() {
            *slot = self.alphabet[(rest % base) as usize];
            rest /= base;
        }
        chars.into_iter().collect()
    }
}
