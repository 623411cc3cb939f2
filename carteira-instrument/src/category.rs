use crate::asset::AssetKind;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::ops::AddAssign;

/// Canonical portfolio category, following the Brazilian statement vocabulary.
///
/// Broker dialects are mapped into this single shape at the ingestion boundary
/// (eg/ Cayman "cash" -> [`Category::ContaCorrente`]).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    RendaFixa,
    FundosInvestimento,
    RendaVariavel,
    Derivativos,
    ContaCorrente,
    Coe,
}

impl Display for Category {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Category::RendaFixa => "renda_fixa",
            Category::FundosInvestimento => "fundos_investimento",
            Category::RendaVariavel => "renda_variavel",
            Category::Derivativos => "derivativos",
            Category::ContaCorrente => "conta_corrente",
            Category::Coe => "coe",
        };
        write!(f, "{name}")
    }
}

impl From<AssetKind> for Category {
    fn from(kind: AssetKind) -> Self {
        match kind {
            AssetKind::Stock
            | AssetKind::Etf
            | AssetKind::Fii
            | AssetKind::Bdr
            | AssetKind::Fiagro
            | AssetKind::Reit
            | AssetKind::Crypto => Category::RendaVariavel,
            AssetKind::Fund => Category::FundosInvestimento,
            AssetKind::Bond | AssetKind::Treasury => Category::RendaFixa,
            AssetKind::Option | AssetKind::Future => Category::Derivativos,
        }
    }
}

/// Per-category value totals of a portfolio at a moment.
#[derive(Debug, Clone, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct CategoryBreakdown {
    pub renda_fixa: Decimal,
    pub fundos_investimento: Decimal,
    pub renda_variavel: Decimal,
    pub derivativos: Decimal,
    pub conta_corrente: Decimal,
    pub coe: Decimal,
}

impl CategoryBreakdown {
    /// Add `value` to the named category bucket.
    pub fn add(&mut self, category: Category, value: Decimal) {
        match category {
            Category::RendaFixa => self.renda_fixa += value,
            Category::FundosInvestimento => self.fundos_investimento += value,
            Category::RendaVariavel => self.renda_variavel += value,
            Category::Derivativos => self.derivativos += value,
            Category::ContaCorrente => self.conta_corrente += value,
            Category::Coe => self.coe += value,
        }
    }

    /// Sum across every category bucket.
    pub fn total(&self) -> Decimal {
        self.renda_fixa
            + self.fundos_investimento
            + self.renda_variavel
            + self.derivativos
            + self.conta_corrente
            + self.coe
    }
}

impl AddAssign<&CategoryBreakdown> for CategoryBreakdown {
    fn add_assign(&mut self, rhs: &CategoryBreakdown) {
        self.renda_fixa += rhs.renda_fixa;
        self.fundos_investimento += rhs.fundos_investimento;
        self.renda_variavel += rhs.renda_variavel;
        self.derivativos += rhs.derivativos;
        self.conta_corrente += rhs.conta_corrente;
        self.coe += rhs.coe;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_from_asset_kind() {
        assert_eq!(Category::from(AssetKind::Fii), Category::RendaVariavel);
        assert_eq!(Category::from(AssetKind::Treasury), Category::RendaFixa);
        assert_eq!(Category::from(AssetKind::Fund), Category::FundosInvestimento);
        assert_eq!(Category::from(AssetKind::Option), Category::Derivativos);
    }

    #[test]
    fn test_breakdown_add_and_total() {
        let mut breakdown = CategoryBreakdown::default();
        breakdown.add(Category::RendaVariavel, Decimal::from(100));
        breakdown.add(Category::ContaCorrente, Decimal::from(50));
        breakdown.add(Category::RendaVariavel, Decimal::from(25));

        assert_eq!(breakdown.renda_variavel, Decimal::from(125));
        assert_eq!(breakdown.total(), Decimal::from(175));
    }
}
