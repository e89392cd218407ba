//! Typed contract bindings
//!
//! Human-readable ABIs cover exactly the surface the bot consumes; the
//! factory/pair/router fragments follow the Uniswap V2 interfaces.

use ethers::prelude::abigen;

abigen!(
    UniswapV2Factory,
    r#"[
        event PairCreated(address indexed token0, address indexed token1, address pair, uint256 pairIndex)
        function getPair(address tokenA, address tokenB) external view returns (address pair)
    ]"#;

    UniswapV2Pair,
    r#"[
        function getReserves() external view returns (uint112 reserve0, uint112 reserve1, uint32 blockTimestampLast)
        function token0() external view returns (address)
        function token1() external view returns (address)
    ]"#;

    UniswapV2Router,
    r#"[
        function getAmountsOut(uint256 amountIn, address[] path) external view returns (uint256[] amounts)
        function swapExactETHForTokensSupportingFeeOnTransferTokens(uint256 amountOutMin, address[] path, address to, uint256 deadline) external payable
        function swapExactTokensForETHSupportingFeeOnTransferTokens(uint256 amountIn, uint256 amountOutMin, address[] path, address to, uint256 deadline) external
    ]"#;

    Erc20Token,
    r#"[
        function name() external view returns (string)
        function symbol() external view returns (string)
        function decimals() external view returns (uint8)
        function totalSupply() external view returns (uint256)
        function balanceOf(address account) external view returns (uint256)
        function allowance(address owner, address spender) external view returns (uint256)
        function approve(address spender, uint256 amount) external returns (bool)
    ]"#;

    RestrictedToken,
    r#"[
        function maxTransactionAmount() external view returns (uint256)
        function maxWalletAmount() external view returns (uint256)
        function tradingEnabled() external view returns (bool)
    ]"#;
);
