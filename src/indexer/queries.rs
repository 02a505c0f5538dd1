/// The subgraph entities the watchers read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    TransfersCommitted,
    TransferRootConfirmed,
    TransferRootBonded,
    TransferBondChallenged,
}

impl QueryKind {
    /// Top-level field of the response `data` object
    pub fn field(&self) -> &'static str {
        match self {
            QueryKind::TransfersCommitted => "transfersCommitteds",
            QueryKind::TransferRootConfirmed => "transferRootConfirmeds",
            QueryKind::TransferRootBonded => "transferRootBondeds",
            QueryKind::TransferBondChallenged => "transferBondChallengeds",
        }
    }

    pub fn query(&self) -> &'static str {
        match self {
            QueryKind::TransfersCommitted => TRANSFERS_COMMITTED,
            QueryKind::TransferRootConfirmed => TRANSFER_ROOT_CONFIRMED,
            QueryKind::TransferRootBonded => TRANSFER_ROOT_BONDED,
            QueryKind::TransferBondChallenged => TRANSFER_BOND_CHALLENGED,
        }
    }
}

const TRANSFERS_COMMITTED: &str = r#"
query TransfersCommitted($token: String, $lastId: ID) {
  transfersCommitteds(
    where: { token: $token, id_gt: $lastId },
    orderBy: id,
    orderDirection: asc,
    first: 1000
  ) {
    id
    rootHash
    destinationChainId
    totalAmount
    rootCommittedAt
    transactionHash
    timestamp
    blockNumber
  }
}
"#;

const TRANSFER_ROOT_CONFIRMED: &str = r#"
query TransferRootConfirmed($token: String, $lastId: ID) {
  transferRootConfirmeds(
    where: { token: $token, id_gt: $lastId },
    orderBy: id,
    orderDirection: asc,
    first: 1000
  ) {
    id
    rootHash
    originChainId
    destinationChainId
    totalAmount
    transactionHash
    timestamp
    blockNumber
  }
}
"#;

const TRANSFER_ROOT_BONDED: &str = r#"
query TransferRootBonded($token: String, $lastId: ID) {
  transferRootBondeds(
    where: { token: $token, id_gt: $lastId },
    orderBy: id,
    orderDirection: asc,
    first: 1000
  ) {
    id
    root
    amount
    from
    transactionHash
    timestamp
    blockNumber
  }
}
"#;

const TRANSFER_BOND_CHALLENGED: &str = r#"
query TransferBondChallenged($token: String, $lastId: ID) {
  transferBondChallengeds(
    where: { token: $token, id_gt: $lastId },
    orderBy: id,
    orderDirection: asc,
    first: 1000
  ) {
    id
    rootHash
    originalAmount
    transactionHash
    timestamp
    blockNumber
  }
}
"#;
