//! Static knowledge about Verus currencies
//!
//! Symbols for well-known currencies, their bridged ERC20 counterparts, the
//! multi-currency basket ids that are never listed as a pair member, and the
//! converters excluded from every output.

/// A currency with a known symbol and optional Ethereum mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownCurrency {
    /// Verus i-address
    pub id: &'static str,
    /// Symbol on the Verus chain
    pub vrsc_symbol: &'static str,
    /// Symbol of the ERC20 counterpart
    pub eth_symbol: &'static str,
    /// ERC20 contract address
    pub eth_address: &'static str,
}

/// Known currencies keyed by i-address
pub const KNOWN_CURRENCIES: &[KnownCurrency] = &[
    KnownCurrency {
        id: "iGBs4DWztRNvNEJBt4mqHszLxfKTNHTkhM",
        vrsc_symbol: "DAI.vETH",
        eth_symbol: "DAI",
        eth_address: "0x6B175474E89094C44Da98b954EedeAC495271d0F",
    },
    KnownCurrency {
        id: "iC5TQFrFXSYLQGkiZ8FYmZHFJzaRF5CYgE",
        vrsc_symbol: "EURC.vETH",
        eth_symbol: "EURC",
        eth_address: "0x1aBaEA1f7C830bD89Acc67eC4af516284b1bC33c",
    },
    KnownCurrency {
        id: "iCkKJuJScy4Z6NSDK7Mt42ZAB2NEnAE1o4",
        vrsc_symbol: "MKR.vETH",
        eth_symbol: "MKR",
        eth_address: "0x9f8F72aA9304c8B593d555F12eF6589cC3A579A2",
    },
    KnownCurrency {
        id: "iL62spNN42Vqdxh8H5nrfNe8d6Amsnfkdx",
        vrsc_symbol: "NATI.vETH",
        eth_symbol: "NATION",
        eth_address: "0x4f14E88B5037F0cA24348Fa707E4A7Ee5318d9d5",
    },
    KnownCurrency {
        id: "i5w5MuNik5NtLcYmNzcvaoixooEebB6MGV",
        vrsc_symbol: "VRSC",
        eth_symbol: "VRSC",
        eth_address: "0xBc2738BA63882891094C99E59a02141Ca1A1C36a",
    },
    KnownCurrency {
        id: "i9nLSK4S1U5sVMq4eJUHR1gbFALz56J9Lj",
        vrsc_symbol: "scrvUSD.vETH",
        eth_symbol: "CRVUSD",
        eth_address: "0x0655977FEb2f289A4aB78af67BAB0d17aAb84367",
    },
    KnownCurrency {
        id: "iS8TfRPfVpKo5FVfSUzfHBQxo9KuzpnqLU",
        vrsc_symbol: "tBTC.vETH",
        eth_symbol: "TBTC",
        eth_address: "0x18084fbA666a33d37592fA2633fD49a74DD93a88",
    },
    KnownCurrency {
        id: "iExBJfZYK7KREDpuhj6PzZBzqMAKaFg7d2",
        vrsc_symbol: "vARRR",
        eth_symbol: "VARR",
        eth_address: "0x45766AE12411450e20bd1c8cca1e63DffD834e19",
    },
    KnownCurrency {
        id: "i61cV2uicKSi1rSMQCBNQeSYC3UAi9GVzd",
        vrsc_symbol: "vUSDC.vETH",
        eth_symbol: "USDC",
        eth_address: "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48",
    },
    KnownCurrency {
        id: "i9oCSqKALwJtcv49xUKS2U2i79h1kX6NEY",
        vrsc_symbol: "vUSDT.vETH",
        eth_symbol: "USDT",
        eth_address: "0xdAC17F958D2ee523a2206206994597C13D831ec7",
    },
    KnownCurrency {
        id: "i9nwxtKuVYX4MSbeULLiK2ttVi6rUEhh4X",
        vrsc_symbol: "vETH",
        eth_symbol: "WETH",
        eth_address: "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2",
    },
    KnownCurrency {
        id: "iJ3WZocnjG9ufv7GKUA4LijQno5gTMb7tP",
        vrsc_symbol: "CHIPS",
        eth_symbol: "CHIPS",
        eth_address: "0x714cFa2DA83b53b8fe2c1c9F99ca723A4c61AD48",
    },
    KnownCurrency {
        id: "i6SapneNdvpkrLPgqPhDVim7Ljek3h2UQZ",
        vrsc_symbol: "SUPERNET",
        eth_symbol: "SUPERNET",
        eth_address: "0x504DAa3346f4AE4E624932FD654339Ad971FB242",
    },
    KnownCurrency {
        id: "iHog9UCTrn95qpUBFCZ7kKz7qWdMA8MQ6N",
        vrsc_symbol: "vDEX",
        eth_symbol: "VDEX",
        eth_address: "0x0609Aede2f67C136bcb0e413E298F6cA8e283c37",
    },
];

/// Multi-currency basket ids; a pair with one of these on either side is not listed
pub const CONVERTER_IDS: &[&str] = &[
    "iHnYAmrS45Hb8GVgyzy7nVQtZ5vttJ9N3X", // SUPERVRSC
    "iFrFn9b6ctse7XBzcWkRbpYMAHoKjbYKqG", // SUPER🛒
    "i4Xr5TAMrDTD99H69EemhjDxJ4ktNskUtc", // Switch
    "i9kVWKU2VwARALpbXn4RS9zvrhvNRaUibb", // Kaiju
    "iH37kRsdfoHtHK5TottP1Yfq8hBSHz9btw", // NATI🦉
    "iHax5qYQGbcMGqJKKrPorpzUBX2oFFXGnY", // Pure
    "iAik7rePReFq2t7LZMZhHCJ52fT5pisJ5C", // vYIELD
    "i3f7tSctFkiPpiedY8QR5Tep9p4qDVebDx", // Bridge.vETH
    "iG1jouaqSJayNb9LCqPzb3yFYD3kUpY2P2", // whales
    "iRt7tpLewArQnRddBVFARGKJStK6w5pDmC", // NATI
];

/// Converters dropped from every output, matched by fully-qualified name
pub const EXCLUDED_CHAINS: &[&str] = &["Bridge.CHIPS", "Bridge.vDEX", "Bridge.vARRR", "whales"];

/// Looks up a known currency by i-address
pub fn lookup(id: &str) -> Option<&'static KnownCurrency> {
    KNOWN_CURRENCIES.iter().find(|c| c.id == id)
}

/// Verus symbol for a known currency
pub fn vrsc_symbol(id: &str) -> Option<&'static str> {
    lookup(id).map(|c| c.vrsc_symbol)
}

/// ERC20 symbol when the currency is bridged, else `fallback`
pub fn erc20_symbol<'a>(id: &str, fallback: &'a str) -> &'a str {
    match lookup(id) {
        Some(c) => c.eth_symbol,
        None => fallback,
    }
}

pub fn is_converter_currency(id: &str) -> bool {
    CONVERTER_IDS.contains(&id)
}

pub fn is_excluded_chain(name: &str) -> bool {
    EXCLUDED_CHAINS.contains(&name)
}
