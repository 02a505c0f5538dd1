use alloy::primitives::{address, Address};
use alloy::sol;

/// ArbRetryableTx precompile on Arbitrum-family rollups
pub const ARB_RETRYABLE_TX: Address = address!("0x000000000000000000000000000000000000006e");

sol! {
    #[sol(rpc)]
    interface IBridge {
        function commitTransfers(uint256 destinationChainId) external;
        function pendingAmountForChainId(uint256 chainId) external view returns (uint256);
        function pendingTransferIdsForChainId(uint256 chainId, uint256 index) external view returns (bytes32);
        function lastCommitTimeForChainId(uint256 chainId) external view returns (uint256);

        function bondTransferRoot(bytes32 rootHash, uint256 destinationChainId, uint256 totalAmount) external;

        function getCredit(address bonder) external view returns (uint256);
        function getDebitAndAdditionalDebit(address bonder) external view returns (uint256);
    }

    #[sol(rpc)]
    interface IArbRetryableTx {
        function redeem(bytes32 ticketId) external returns (bytes32);
        function getTimeout(bytes32 ticketId) external view returns (uint256);

        event RedeemScheduled(
            bytes32 indexed ticketId,
            bytes32 indexed retryTxHash,
            uint64 indexed sequenceNum,
            uint64 donatedGas,
            address gasDonor,
            uint256 maxRefund,
            uint256 submissionFeeRefund
        );
    }

    /// Emitted by the rollup inbox on L1 for every L1→L2 message
    event InboxMessageDelivered(uint256 indexed messageNum, bytes data);
}
