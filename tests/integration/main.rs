mod mock_gateway;
mod simulation;
